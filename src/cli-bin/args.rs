use rtsim::prelude::*;

const DEFAULT_AFTER_HELP: &str = "Refer to the crate's documentation for further help";

#[derive(clap::Parser, Debug)]
#[command(after_help=DEFAULT_AFTER_HELP)]
pub struct Args {
    #[command(flatten, next_help_heading="Input Files")]
    pub inputs: InputArgs,

    #[command(flatten, next_help_heading="Scheduling Configuration")]
    pub config: ConfigArgs,

    #[command(flatten, next_help_heading="Output")]
    pub output: OutputArgs,
}

#[derive(clap::Args, Debug)]
pub struct InputArgs {
    /// Platform description file (JSON)
    #[arg(long="platform", value_name="PLATFORM FILE")]
    pub platform: String,

    /// Scenario data file (JSON)
    #[arg(long="scenario", value_name="SCENARIO FILE")]
    pub scenario: String,
}

#[derive(clap::Args, Debug)]
pub struct ConfigArgs {
    /// Task-to-cluster placement policy, as name[:key=value,...]
    #[arg(long="allocator", value_name="ALLOCATOR", default_value="ff")]
    pub allocator: String,

    /// Scheduling algorithm: EDF over plain CBS servers, or with GRUB or
    /// CASH bandwidth reclamation
    #[arg(long="scheduler", value_enum, value_name="SCHEDULER", default_value="edf")]
    pub scheduler: SchedulerArg,

    /// DVFS/DPM policy
    #[arg(long="policy", value_enum, value_name="POLICY", default_value="none")]
    pub policy: PowerPolicyArg,

    /// Server admission test
    #[arg(long="admission", value_enum, value_name="TEST", default_value="capacity")]
    pub admission: AdmissionTest,

    /// Reaction to deadline misses
    #[arg(long="deadline-miss", value_enum, value_name="POLICY", default_value="continue")]
    pub deadline_miss: DeadlineMissPolicy,

    /// Cooldown between DVFS/DPM adjustments, for the timer-deferred
    /// policies (seconds)
    #[arg(long="cooldown", value_name="SECONDS", default_value="1.0")]
    pub cooldown: f64,

    /// Seed for allocators with a configurable random source
    #[arg(long="seed", value_name="N", default_value="0")]
    pub seed: u64,

    /// Stop the simulation at this time instead of draining all events
    /// (seconds)
    #[arg(long="until", value_name="SECONDS")]
    pub until: Option<f64>,
}

#[derive(clap::Args, Debug)]
pub struct OutputArgs {
    /// Write the trace as JSON lines to this file
    #[arg(long="trace", value_name="TRACE FILE")]
    pub trace: Option<String>,

    /// Print post-run statistics (and energy, when power models are given)
    #[arg(long="summary", default_value="false", action=clap::ArgAction::SetTrue)]
    pub summary: bool,

    /// Write an rtsched LaTeX Gantt chart to this file
    #[arg(long="gantt", value_name="GANTT FILE")]
    pub gantt: Option<String>,
}

#[derive(Debug, Clone)]
#[derive(PartialEq, Eq)]
#[derive(clap::ValueEnum)]
pub enum PowerPolicyArg {
    /// Fixed maximum frequency, no DPM
    None,
    #[value(name = "pa")]
    PowerAware,
    Ffa,
    Csf,
    #[value(name = "pa-timer")]
    PowerAwareTimer,
    FfaTimer,
    CsfTimer,
}

#[derive(Debug, Clone)]
#[derive(PartialEq, Eq)]
#[derive(clap::ValueEnum)]
pub enum SchedulerArg {
    /// Global EDF over plain CBS servers
    Edf,
    /// EDF with GRUB bandwidth reclamation
    Grub,
    /// EDF with CASH capacity sharing
    Cash,
}

impl SchedulerArg {
    pub fn reclamation(&self) -> Box<dyn ReclamationPolicy> {
        match self {
            Self::Edf => Box::new(CbsPolicy::new()),
            Self::Grub => Box::new(GrubPolicy::new()),
            Self::Cash => Box::new(CashPolicy::new()),
        }
    }
}

impl PowerPolicyArg {
    pub fn instantiate(&self, cooldown: f64) -> Option<DvfsDpm> {
        let deferred = Duration::secs(cooldown);
        match self {
            Self::None => None,
            Self::PowerAware =>
                Some(DvfsDpm::new(Box::new(PowerAware::new()), Duration::ZERO)),
            Self::Ffa =>
                Some(DvfsDpm::new(Box::new(Ffa::new()), Duration::ZERO)),
            Self::Csf =>
                Some(DvfsDpm::new(Box::new(Csf::new()), Duration::ZERO)),
            Self::PowerAwareTimer =>
                Some(DvfsDpm::new(Box::new(PowerAware::new()), deferred)),
            Self::FfaTimer =>
                Some(DvfsDpm::new(Box::new(Ffa::new()), deferred)),
            Self::CsfTimer =>
                Some(DvfsDpm::new(Box::new(Csf::new()), deferred)),
        }
    }
}
