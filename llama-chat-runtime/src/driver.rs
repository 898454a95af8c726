use anyhow::{anyhow, Result};
use llama_chat_core::{
    dialog::{Dialog, Role},
    generation::{GenerationConfig, Generator},
};
use slog::{debug, info, warn, Logger};

use crate::{
    console::ChatOutput,
    consumer::{consume_stream, StreamOutcome},
};

/// What happened to one dialog of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialogReport {
    pub index: usize,
    pub outcome: StreamOutcome,
    pub fragments: usize,
}

/// ChatDriver
/// Runs dialogs one at a time against a generator and streams the replies to an output.
/// Only the leader of a distributed launch talks to the generator and owns the console.
pub struct ChatDriver<G> {
    logger: Logger,
    generator: G,
    config: GenerationConfig,
    leader: bool,
}

impl<G: Generator> ChatDriver<G> {
    pub fn new(logger: &Logger, generator: G, config: GenerationConfig) -> Self {
        Self {
            logger: logger.clone(),
            generator,
            config,
            leader: true,
        }
    }

    /// Follower ranks keep the process group alive but stay silent
    pub fn with_leader(mut self, leader: bool) -> Self {
        self.leader = leader;
        self
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Print the banner, then for each dialog its prompt messages followed by the streamed reply.
    /// System messages steer the model but are not echoed.
    pub async fn run(
        &self,
        dialogs: &[Dialog],
        output: &mut impl ChatOutput,
    ) -> Result<Vec<DialogReport>> {
        if !self.leader {
            info!(self.logger, "not the leader rank, leaving the dialogs to rank 0"; "dialogs" => dialogs.len());
            return Ok(vec![]);
        }
        output.banner()?;

        let mut reports = Vec::with_capacity(dialogs.len());
        for (index, dialog) in dialogs.iter().enumerate() {
            for message in dialog.iter().filter(|m| m.role() != Role::System) {
                output.message(message)?;
            }

            debug!(self.logger, "requesting completion"; "dialog" => index, "messages" => dialog.len());
            let mut streams = self
                .generator
                .chat_completion(vec![dialog.clone()], &self.config)
                .await?;
            if streams.is_empty() {
                return Err(anyhow!("generator returned no stream for dialog {index}"));
            }
            let stream = &mut streams[0];

            let report = consume_stream(stream, output).await?;
            if report.outcome == StreamOutcome::Exhausted {
                warn!(self.logger, "stream ended without a finish marker"; "dialog" => index, "fragments" => report.fragments);
            }
            output.end_dialog()?;

            reports.push(DialogReport {
                index,
                outcome: report.outcome,
                fragments: report.fragments,
            });
        }

        info!(self.logger, "chat completion run finished"; "dialogs" => reports.len());
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, io, sync::Mutex};

    use llama_chat_core::{
        dialog::{Batch, Message},
        errors::GenerationError,
        generation::{token_channel, TokenResult, TokenStream},
        model_args::ModelArgs,
    };

    use super::*;
    use crate::consumer::TokenSink;

    /// Replays one canned script per call and records every batch it was given
    struct ScriptedGenerator {
        args: ModelArgs,
        scripts: Mutex<VecDeque<Vec<TokenResult>>>,
        batches: Mutex<Vec<Batch>>,
        empty: bool,
    }

    impl ScriptedGenerator {
        fn new(scripts: Vec<Vec<TokenResult>>) -> Self {
            Self {
                args: ModelArgs::default(),
                scripts: Mutex::new(scripts.into()),
                batches: Mutex::new(vec![]),
                empty: false,
            }
        }
    }

    impl Generator for ScriptedGenerator {
        fn args(&self) -> &ModelArgs {
            &self.args
        }

        async fn chat_completion(
            &self,
            batch: Batch,
            _config: &GenerationConfig,
        ) -> Result<Vec<TokenStream>, GenerationError> {
            self.batches.lock().unwrap().push(batch);
            if self.empty {
                return Ok(vec![]);
            }
            let script = self.scripts.lock().unwrap().pop_front().unwrap_or_default();
            let (tx, stream) = token_channel();
            for result in script {
                tx.send(result).await;
            }
            Ok(vec![stream])
        }
    }

    #[derive(Debug, Default)]
    struct RecordingOutput {
        lines: Vec<String>,
    }

    impl TokenSink for RecordingOutput {
        fn emit(&mut self, text: &str) -> io::Result<()> {
            self.lines.push(format!("token:{text}"));
            Ok(())
        }
    }

    impl ChatOutput for RecordingOutput {
        fn notice(&mut self, text: &str) -> io::Result<()> {
            self.lines.push(format!("notice:{text}"));
            Ok(())
        }

        fn banner(&mut self) -> io::Result<()> {
            self.lines.push("banner".to_string());
            Ok(())
        }

        fn message(&mut self, message: &Message) -> io::Result<()> {
            self.lines
                .push(format!("{}: {}", message.role().label(), message.content()));
            Ok(())
        }

        fn end_dialog(&mut self) -> io::Result<()> {
            self.lines.push("end".to_string());
            Ok(())
        }
    }

    fn logger() -> Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    fn config() -> GenerationConfig {
        GenerationConfig::new(0.5, 0.8, 1024).unwrap()
    }

    #[tokio::test]
    async fn test_run_prints_dialogs_in_order() {
        let generator = ScriptedGenerator::new(vec![
            vec![
                TokenResult::token("Whisk "),
                TokenResult::token("eggs"),
                TokenResult::finish(),
            ],
            vec![
                TokenResult::token("Spring "),
                TokenResult::token("in Paris"),
                TokenResult::finish(),
            ],
        ]);
        let driver = ChatDriver::new(&logger(), generator, config());
        let dialogs = vec![
            Dialog::new(vec![Message::user("what is the recipe of mayonnaise?")]).unwrap(),
            Dialog::new(vec![
                Message::system("Always answer with Haiku"),
                Message::user("I am going to Paris, what should I see?"),
            ])
            .unwrap(),
        ];

        let mut output = RecordingOutput::default();
        let reports = driver.run(&dialogs, &mut output).await.unwrap();

        assert_eq!(
            output.lines,
            vec![
                "banner",
                "User: what is the recipe of mayonnaise?",
                "token:Whisk ",
                "token:eggs",
                "end",
                "User: I am going to Paris, what should I see?",
                "token:Spring ",
                "token:in Paris",
                "end",
            ]
        );
        assert_eq!(
            reports,
            vec![
                DialogReport {
                    index: 0,
                    outcome: StreamOutcome::Finished,
                    fragments: 2
                },
                DialogReport {
                    index: 1,
                    outcome: StreamOutcome::Finished,
                    fragments: 2
                },
            ]
        );

        // one single dialog batch per request, system message included
        let batches = driver.generator().batches.lock().unwrap();
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|batch| batch.len() == 1));
        assert_eq!(batches[1][0], dialogs[1]);
    }

    #[tokio::test]
    async fn test_run_accepts_stream_without_finish_marker() {
        let generator = ScriptedGenerator::new(vec![vec![TokenResult::token("partial")]]);
        let driver = ChatDriver::new(&logger(), generator, config());
        let dialogs = vec![Dialog::new(vec![Message::user("hello")]).unwrap()];

        let mut output = RecordingOutput::default();
        let reports = driver.run(&dialogs, &mut output).await.unwrap();

        assert_eq!(reports[0].outcome, StreamOutcome::Exhausted);
        assert_eq!(output.lines.last().map(String::as_str), Some("end"));
    }

    #[tokio::test]
    async fn test_run_with_no_dialogs_prints_banner_only() {
        let driver = ChatDriver::new(&logger(), ScriptedGenerator::new(vec![]), config());
        let mut output = RecordingOutput::default();
        let reports = driver.run(&[], &mut output).await.unwrap();
        assert!(reports.is_empty());
        assert_eq!(output.lines, vec!["banner"]);
    }

    #[tokio::test]
    async fn test_follower_rank_stays_silent() {
        let generator = ScriptedGenerator::new(vec![vec![
            TokenResult::token("hi"),
            TokenResult::finish(),
        ]]);
        let driver = ChatDriver::new(&logger(), generator, config()).with_leader(false);
        let dialogs = vec![Dialog::new(vec![Message::user("hello")]).unwrap()];

        let mut output = RecordingOutput::default();
        let reports = driver.run(&dialogs, &mut output).await.unwrap();

        assert!(reports.is_empty());
        assert!(output.lines.is_empty());
        assert!(driver.generator().batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_fails_when_generator_returns_no_stream() {
        let mut generator = ScriptedGenerator::new(vec![]);
        generator.empty = true;
        let driver = ChatDriver::new(&logger(), generator, config());
        let dialogs = vec![Dialog::new(vec![Message::user("hello")]).unwrap()];

        let mut output = RecordingOutput::default();
        assert!(driver.run(&dialogs, &mut output).await.is_err());
    }
}
