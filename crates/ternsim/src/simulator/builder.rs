use super::trace::TraceSink;
use super::{ConfigError, SimError, Simulator};
use crate::circuit::Design;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SimulatorOptions {
    /// Unit evaluations allowed in one settle before it is reported as a
    /// combinational loop.
    pub max_settle_iterations: usize,
    /// Feed the trace sink after every quiesced instant.
    pub trace_on_quiesce: bool,
}

impl Default for SimulatorOptions {
    fn default() -> Self {
        Self {
            max_settle_iterations: 100_000,
            trace_on_quiesce: true,
        }
    }
}

impl SimulatorOptions {
    /// Parses options from TOML; missing keys keep their defaults.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}

/// A fluent builder for configuring and initializing a [`Simulator`].
pub struct SimulatorBuilder {
    design: Design,
    options: SimulatorOptions,
    trace: Option<Box<dyn TraceSink>>,
}

impl SimulatorBuilder {
    pub(crate) fn new(design: Design) -> Self {
        Self {
            design,
            options: SimulatorOptions::default(),
            trace: None,
        }
    }

    pub fn options(mut self, options: SimulatorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn max_settle_iterations(mut self, iterations: usize) -> Self {
        self.options.max_settle_iterations = iterations;
        self
    }

    pub fn trace_on_quiesce(mut self, enable: bool) -> Self {
        self.options.trace_on_quiesce = enable;
        self
    }

    /// Records storage values into `sink`.
    pub fn trace<T: TraceSink + 'static>(mut self, sink: T) -> Self {
        self.trace = Some(Box::new(sink));
        self
    }

    /// Builds the simulator and performs an initial [`Simulator::reset`].
    pub fn build(self) -> Result<Simulator, SimError> {
        if let Some(circuit) = self.design.circuits.values().find(|c| !c.is_finalized()) {
            return Err(SimError::NotFinalized {
                module: circuit.module(),
            });
        }
        let mut simulator = Simulator::new(self.design, self.options, self.trace);
        simulator.reset()?;
        Ok(simulator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_toml_keep_defaults() {
        let options = SimulatorOptions::from_toml("max_settle_iterations = 64").unwrap();
        assert_eq!(options.max_settle_iterations, 64);
        assert!(options.trace_on_quiesce);
        assert_eq!(SimulatorOptions::from_toml("").unwrap(), SimulatorOptions::default());
    }

    #[test]
    fn test_options_reject_wrong_types() {
        let err = SimulatorOptions::from_toml("trace_on_quiesce = 3").unwrap_err();
        assert!(err.to_string().starts_with("invalid simulator options"));
    }
}
