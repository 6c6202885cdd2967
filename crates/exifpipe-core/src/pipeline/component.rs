//! The pipeline component capability and its lifecycle state machine.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use super::channel::{Receiver, Sender};
use crate::config::Config;
use crate::error::{ConfigError, ExifPipeError, PipelineError, PipelineResult};
use crate::types::ScanStats;

/// One unit of work in a chain.
///
/// Implementations only provide behaviour; lifecycle ordering is enforced
/// by [`Stage`], which is what the assembler actually holds.
#[async_trait]
pub trait PipelineComponent: Send {
    /// Registry name of the component.
    fn name(&self) -> &'static str;

    /// Source components produce records themselves and take no upstream.
    fn accepts_input(&self) -> bool {
        true
    }

    /// Components whose only purpose is feeding a downstream.
    fn requires_output(&self) -> bool {
        false
    }

    /// Validate settings and allocate resources. Called once, after wiring.
    fn init(&mut self, config: Arc<Config>) -> Result<(), ConfigError>;

    fn set_input(&mut self, input: Receiver) -> Result<(), ConfigError>;

    fn set_output(&mut self, output: Sender);

    /// Consume the upstream until end-of-stream, forward the sentinel and
    /// return.
    async fn run(&mut self) -> PipelineResult<()>;

    /// Scan counters, for components that ingest files.
    fn stats(&self) -> Option<ScanStats> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Uninitialized,
    Initialized,
    Running,
    Finished,
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageState::Uninitialized => "uninitialized",
            StageState::Initialized => "initialized",
            StageState::Running => "running",
            StageState::Finished => "finished",
        };
        f.write_str(s)
    }
}

/// A named component plus its lifecycle state.
///
/// `Uninitialized -> Initialized -> Running -> Finished`. Wiring is only
/// allowed before `run`; every other out-of-order call is rejected with
/// [`PipelineError::InvalidState`].
pub struct Stage {
    name: String,
    state: StageState,
    has_input: bool,
    has_output: bool,
    component: Box<dyn PipelineComponent>,
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("has_input", &self.has_input)
            .field("has_output", &self.has_output)
            .finish()
    }
}

impl Stage {
    pub fn new(name: impl Into<String>, component: Box<dyn PipelineComponent>) -> Self {
        Self {
            name: name.into(),
            state: StageState::Uninitialized,
            has_input: false,
            has_output: false,
            component,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> StageState {
        self.state
    }

    pub fn stats(&self) -> Option<ScanStats> {
        self.component.stats()
    }

    fn invalid(&self, action: &'static str) -> PipelineError {
        PipelineError::InvalidState {
            stage: self.name.clone(),
            action,
            state: self.state.to_string(),
        }
    }

    fn ensure_wirable(&self, action: &'static str) -> PipelineResult<()> {
        match self.state {
            StageState::Uninitialized | StageState::Initialized => Ok(()),
            _ => Err(self.invalid(action)),
        }
    }

    pub fn set_input(&mut self, input: Receiver) -> Result<(), ExifPipeError> {
        self.ensure_wirable("set input")?;
        if !self.component.accepts_input() {
            return Err(ConfigError::InputNotAccepted(self.name.clone()).into());
        }
        self.component.set_input(input)?;
        self.has_input = true;
        Ok(())
    }

    pub fn set_output(&mut self, output: Sender) -> Result<(), ExifPipeError> {
        self.ensure_wirable("set output")?;
        self.component.set_output(output);
        self.has_output = true;
        Ok(())
    }

    /// Check wiring and hand the frozen configuration to the component.
    pub fn init(&mut self, config: Arc<Config>) -> Result<(), ExifPipeError> {
        if self.state != StageState::Uninitialized {
            return Err(self.invalid("init").into());
        }
        if self.component.accepts_input() && !self.has_input {
            return Err(ConfigError::MissingInput(self.name.clone()).into());
        }
        if self.component.requires_output() && !self.has_output {
            return Err(ConfigError::MissingOutput(self.name.clone()).into());
        }
        self.component.init(config)?;
        self.state = StageState::Initialized;
        tracing::debug!("Stage [{}] initialized", self.name);
        Ok(())
    }

    pub async fn run(&mut self) -> PipelineResult<()> {
        if self.state != StageState::Initialized {
            return Err(self.invalid("run"));
        }
        self.state = StageState::Running;
        let start = Instant::now();
        let result = self.component.run().await;
        self.state = StageState::Finished;

        match &result {
            Ok(()) => tracing::debug!("Stage [{}] finished in {:?}", self.name, start.elapsed()),
            Err(e) => tracing::error!(
                "Stage [{}] failed after {:?}: {}",
                self.name,
                start.elapsed(),
                e
            ),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::channel::{Message, Ports};
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct Passthrough {
        ports: Ports,
        source: bool,
    }

    #[async_trait]
    impl PipelineComponent for Passthrough {
        fn name(&self) -> &'static str {
            "passthrough"
        }

        fn accepts_input(&self) -> bool {
            !self.source
        }

        fn requires_output(&self) -> bool {
            self.source
        }

        fn init(&mut self, _config: Arc<Config>) -> Result<(), ConfigError> {
            Ok(())
        }

        fn set_input(&mut self, input: Receiver) -> Result<(), ConfigError> {
            self.ports.set_input(input);
            Ok(())
        }

        fn set_output(&mut self, output: Sender) {
            self.ports.set_output(output);
        }

        async fn run(&mut self) -> PipelineResult<()> {
            while self.ports.next_batch().await.is_some() {}
            self.ports.finish().await;
            Ok(())
        }
    }

    fn config() -> Arc<Config> {
        Arc::new(Config::default())
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let mut stage = Stage::new("pass", Box::<Passthrough>::default());
        let (tx, rx) = mpsc::channel(1);
        stage.set_input(rx).unwrap();
        assert_eq!(stage.state(), StageState::Uninitialized);

        stage.init(config()).unwrap();
        assert_eq!(stage.state(), StageState::Initialized);

        tx.send(Message::EndOfStream).await.unwrap();
        stage.run().await.unwrap();
        assert_eq!(stage.state(), StageState::Finished);
    }

    #[tokio::test]
    async fn test_out_of_order_calls_are_rejected() {
        let mut stage = Stage::new("pass", Box::<Passthrough>::default());
        let err = stage.run().await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidState { action: "run", .. }));

        let (_tx, rx) = mpsc::channel(1);
        stage.set_input(rx).unwrap();
        stage.init(config()).unwrap();
        assert!(stage.init(config()).is_err());

        drop(_tx);
        stage.run().await.unwrap();
        let (_tx2, rx2) = mpsc::channel(1);
        let err = stage.set_input(rx2).unwrap_err();
        assert!(err.to_string().contains("finished"));
    }

    #[test]
    fn test_source_rejects_input() {
        let mut stage = Stage::new(
            "src",
            Box::new(Passthrough {
                source: true,
                ..Default::default()
            }),
        );
        let (_tx, rx) = mpsc::channel(1);
        let err = stage.set_input(rx).unwrap_err();
        assert!(matches!(
            err,
            ExifPipeError::Config(ConfigError::InputNotAccepted(_))
        ));
    }

    #[test]
    fn test_init_checks_wiring() {
        let mut consumer = Stage::new("pass", Box::<Passthrough>::default());
        assert!(matches!(
            consumer.init(config()),
            Err(ExifPipeError::Config(ConfigError::MissingInput(_)))
        ));

        let mut source = Stage::new(
            "src",
            Box::new(Passthrough {
                source: true,
                ..Default::default()
            }),
        );
        assert!(matches!(
            source.init(config()),
            Err(ExifPipeError::Config(ConfigError::MissingOutput(_)))
        ));
    }
}
