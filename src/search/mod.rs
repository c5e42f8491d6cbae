mod retriever;

pub use retriever::{select_hard_filter, Retriever};
