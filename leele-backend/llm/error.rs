/// Errors from completion provider calls.
///
/// Providers map transport and protocol failures into these variants; the
/// [`Completion`](super::Completion) service adds the operation label on top.
#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("decode: {0}")]
    Decode(String),

    #[error("empty response")]
    EmptyResponse,
}
