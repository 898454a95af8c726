use llama_chat_core::generation::TokenStream;

/// Destination for streamed text fragments
pub trait TokenSink {
    fn emit(&mut self, text: &str) -> std::io::Result<()>;
}

/// How a dialog's stream came to an end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// A finished marker was received
    Finished,

    /// The stream ran dry without a finished marker
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamReport {
    pub outcome: StreamOutcome,

    /// Number of fragments handed to the sink
    pub fragments: usize,
}

/// Drain one dialog's stream into `sink`, fragment by fragment.
/// Stops at the first finished marker without emitting its text or reading past it.
pub async fn consume_stream(
    stream: &mut TokenStream,
    sink: &mut impl TokenSink,
) -> std::io::Result<StreamReport> {
    let mut fragments = 0;
    while let Some(result) = stream.next().await {
        if result.finished {
            return Ok(StreamReport {
                outcome: StreamOutcome::Finished,
                fragments,
            });
        }
        sink.emit(&result.text)?;
        fragments += 1;
    }
    Ok(StreamReport {
        outcome: StreamOutcome::Exhausted,
        fragments,
    })
}
