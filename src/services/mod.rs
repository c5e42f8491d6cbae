mod chat;
mod synthesizer;

pub use chat::ChatService;
pub use synthesizer::AnswerSynthesizer;
