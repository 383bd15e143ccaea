use std::process::ExitCode;

use netautotest_engine::CampaignRun;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Failed,
    Aborted,
}

impl Outcome {
    pub fn from_run(run: &CampaignRun) -> Self {
        if run.passed() {
            Outcome::Passed
        } else {
            Outcome::Failed
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Outcome::Passed => 0,
            Outcome::Failed => 1,
            Outcome::Aborted => 2,
        }
    }
}

impl From<Outcome> for ExitCode {
    fn from(outcome: Outcome) -> Self {
        ExitCode::from(outcome.code())
    }
}
