mod console;
mod consumer;
mod dialogs;
mod driver;

pub use console::{ChatOutput, ConsoleOutput};
pub use consumer::{consume_stream, StreamOutcome, StreamReport, TokenSink};
pub use dialogs::{build_batch, example_dialogs, BatchPlan, VISION_PROMPT};
pub use driver::{ChatDriver, DialogReport};
