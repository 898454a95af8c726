use std::{io::ErrorKind, path::Path};

use anyhow::Result;
use llama_chat_core::{
    dialog::{ContentItem, Dialog, Message},
    model_args::ModelArgs,
};
use slog::{debug, info, warn, Logger};

/// Prompt attached to the image in the vision example
pub const VISION_PROMPT: &str = "Describe this image in two sentences";

/// BatchPlan
/// The dialogs to run plus any diagnostics produced while assembling them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    pub dialogs: Vec<Dialog>,
    pub notices: Vec<String>,
}

/// Text only conversations every model can run
pub fn example_dialogs() -> Result<Vec<Dialog>> {
    Ok(vec![
        Dialog::new(vec![Message::user("what is the recipe of mayonnaise?")])?,
        Dialog::new(vec![
            Message::user("I am going to Paris, what should I see?"),
            Message::assistant(
                "Paris, the capital of France, is known for its stunning architecture, art museums, historical landmarks, and romantic atmosphere. Here are some of the top attractions to see in Paris:\n\n\
                1. The Eiffel Tower: The iconic Eiffel Tower is one of the most recognizable landmarks in the world and offers breathtaking views of the city.\n\
                2. The Louvre Museum: The Louvre is one of the world's largest and most famous museums, housing an impressive collection of art and artifacts, including the Mona Lisa.\n\
                3. Notre-Dame Cathedral: This beautiful cathedral is one of the most famous landmarks in Paris and is known for its Gothic architecture and stunning stained glass windows.\n\n\
                These are just a few of the many attractions that Paris has to offer. With so much to see and do, it's no wonder that Paris is one of the most popular tourist destinations in the world.",
            ),
            Message::user("What is so great about #1?"),
        ])?,
        Dialog::new(vec![
            Message::system("Always answer with Haiku"),
            Message::user("I am going to Paris, what should I see?"),
        ])?,
    ])
}

/// Assemble the batch for this run.
/// The vision example is appended only when the model can see and the image is readable,
/// a missing image degrades to a notice instead of an error.
pub async fn build_batch(logger: &Logger, args: &ModelArgs, image_path: &Path) -> Result<BatchPlan> {
    let mut plan = BatchPlan {
        dialogs: example_dialogs()?,
        notices: vec![],
    };
    if !args.supports_vision() {
        debug!(logger, "model has no vision support, skipping vision example");
        return Ok(plan);
    }

    match tokio::fs::read(image_path).await {
        Ok(image) => {
            info!(logger, "adding vision example"; "path" => image_path.display().to_string(), "bytes" => image.len());
            plan.dialogs.push(Dialog::new(vec![Message::user(vec![
                ContentItem::Media(image),
                ContentItem::Text(VISION_PROMPT.to_string()),
            ])])?);
        }
        Err(e) => {
            let notice = if e.kind() == ErrorKind::NotFound {
                format!(
                    "Image not found at {}, skipping vision example.",
                    image_path.display()
                )
            } else {
                format!(
                    "Could not read image at {}: {e}, skipping vision example.",
                    image_path.display()
                )
            };
            warn!(logger, "{}", notice);
            plan.notices.push(notice);
        }
    }
    Ok(plan)
}
