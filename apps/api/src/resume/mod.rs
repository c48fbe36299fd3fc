// Resume ingestion: pull a PDF from object storage, extract its text, open a session.

pub mod handlers;
pub mod ingest;
