mod chunker;
mod enricher;
mod pdf;
mod pipeline;

pub use chunker::{estimate_tokens, TextChunk, TextChunker};
pub use enricher::MetadataEnricher;
pub use pdf::{PageContent, PdfExtractor};
pub use pipeline::{chunk_id, IngestReport, IngestStatus, IngestionPipeline};
