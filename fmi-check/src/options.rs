use std::path::PathBuf;

use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};

use crate::sim::params::DEFAULT_MAX_OUTPUT_POINTS;

/// Check and simulate an FMI 2.0 model through its Model Exchange and Co-Simulation interfaces.
#[derive(Debug, Parser)]
#[command(version, about, disable_help_flag = true)]
pub struct FmiCheckOptions {
    /// Name of the built-in model to check.
    #[arg(required_unless_present = "list")]
    pub model: Option<String>,

    /// List the built-in models and exit.
    #[arg(long)]
    pub list: bool,

    /// Name of the CSV file name with input data.
    #[arg(short = 'i', long)]
    pub input_file: Option<PathBuf>,

    /// Simulation result output CSV file name. Default is to use standard output.
    #[arg(short = 'o', long)]
    pub output_file: Option<PathBuf>,

    /// Error log file name. Default is to use standard error.
    #[arg(short = 'e', long)]
    pub error_log: Option<PathBuf>,

    /// Separator to be used in CSV output.
    #[arg(short = 'c', long, default_value_t = ',')]
    pub separator: char,

    /// Print also left limit values at event points to the output file to investigate event
    /// behaviour. Default is to only print values after event handling.
    #[arg(short = 'd', long)]
    pub print_left_limit: bool,

    /// Print all variables to the output file. Default is to only print outputs.
    #[arg(short = 'f', long)]
    pub print_all_variables: bool,

    /// For ME simulation: step size to use in forward Euler. For CS simulation: communication
    /// step size. Default is to calculate a step size from the number of output points.
    #[arg(short = 'h', long)]
    pub step_size: Option<f64>,

    /// Maximum number of output points. "-n 0" means output at every step and the number of
    /// outputs is decided by the -h option.
    #[arg(short = 'n', long, default_value_t = DEFAULT_MAX_OUTPUT_POINTS)]
    pub num_steps: usize,

    /// Simulation stop time, default is to use information from the model's default experiment.
    #[arg(short = 's', long)]
    pub stop_time: Option<f64>,

    /// Only check the Model Exchange interface.
    #[arg(long, conflicts_with = "cs")]
    pub me: bool,

    /// Only check the Co-Simulation interface.
    #[arg(long)]
    pub cs: bool,

    /// Print help
    #[arg(long, action = clap::ArgAction::Help)]
    pub help: Option<bool>,

    #[command(flatten)]
    pub verbose: Verbosity<InfoLevel>,
}

impl Default for FmiCheckOptions {
    fn default() -> Self {
        Self {
            model: None,
            list: false,
            input_file: None,
            output_file: None,
            error_log: None,
            separator: ',',
            print_left_limit: false,
            print_all_variables: false,
            step_size: None,
            num_steps: DEFAULT_MAX_OUTPUT_POINTS,
            stop_time: None,
            me: false,
            cs: false,
            help: None,
            verbose: Verbosity::new(0, 0),
        }
    }
}

impl FmiCheckOptions {
    /// Whether the Model Exchange run was selected. Both interfaces run unless one is picked.
    pub fn run_me(&self) -> bool {
        self.me || !self.cs
    }

    pub fn run_cs(&self) -> bool {
        self.cs || !self.me
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let opts = FmiCheckOptions::try_parse_from([
            "fmi-check",
            "-h",
            "0.1",
            "-n",
            "0",
            "-s",
            "3",
            "-c",
            ";",
            "-d",
            "--me",
            "BouncingBall",
        ])
        .unwrap();
        assert_eq!(opts.model.as_deref(), Some("BouncingBall"));
        assert_eq!(opts.step_size, Some(0.1));
        assert_eq!(opts.num_steps, 0);
        assert_eq!(opts.stop_time, Some(3.0));
        assert_eq!(opts.separator, ';');
        assert!(opts.print_left_limit);
        assert!(opts.run_me());
        assert!(!opts.run_cs());
    }

    #[test]
    fn test_defaults() {
        let opts = FmiCheckOptions::try_parse_from(["fmi-check", "Stair"]).unwrap();
        assert_eq!(opts.num_steps, 500);
        assert_eq!(opts.separator, ',');
        assert!(opts.run_me() && opts.run_cs());
        assert!(FmiCheckOptions::try_parse_from(["fmi-check"]).is_err());
    }
}
