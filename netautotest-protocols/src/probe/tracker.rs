//! ## netautotest-protocols::probe::tracker
//! Initiator-side bookkeeping: assigns sequence numbers, matches echoes by
//! sequence (not arrival order) and decides which probes are lost.

use std::time::Duration;

use netautotest_core::ProbeSample;

/// What happened to an incoming echo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoOutcome {
    Matched(Duration),
    /// Sequence already matched; the echo is ignored.
    Duplicate,
    /// Sequence was never sent in this session.
    Unknown,
    /// Echoed send timestamp differs from the one recorded.
    Mismatched,
    /// Arrived after the lost-probe deadline; the probe stays lost.
    Late,
}

#[derive(Debug, Clone, Copy)]
struct SentProbe {
    send_time: Duration,
    receive_time: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct ProbeTracker {
    deadline: Duration,
    probes: Vec<SentProbe>,
}

impl ProbeTracker {
    /// `deadline` bounds how long after its send an echo still counts.
    pub fn new(deadline: Duration) -> Self {
        Self {
            deadline,
            probes: Vec::new(),
        }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Records a send and returns the sequence number to put on the wire.
    pub fn on_send(&mut self, send_time: Duration) -> u64 {
        self.probes.push(SentProbe {
            send_time,
            receive_time: None,
        });
        (self.probes.len() - 1) as u64
    }

    pub fn on_echo(&mut self, sequence: u64, send_ts_ns: u64, receive_time: Duration) -> EchoOutcome {
        let Some(probe) = usize::try_from(sequence)
            .ok()
            .and_then(|idx| self.probes.get_mut(idx))
        else {
            return EchoOutcome::Unknown;
        };

        if probe.send_time.as_nanos() != u128::from(send_ts_ns) || receive_time < probe.send_time {
            return EchoOutcome::Mismatched;
        }
        if probe.receive_time.is_some() {
            return EchoOutcome::Duplicate;
        }

        let rtt = receive_time - probe.send_time;
        if rtt > self.deadline {
            return EchoOutcome::Late;
        }

        probe.receive_time = Some(receive_time);
        EchoOutcome::Matched(rtt)
    }

    pub fn sent(&self) -> u64 {
        self.probes.len() as u64
    }

    pub fn received(&self) -> u64 {
        self.probes
            .iter()
            .filter(|p| p.receive_time.is_some())
            .count() as u64
    }

    /// Latest deadline among unanswered probes, `None` once every probe has
    /// been answered.
    pub fn outstanding_deadline(&self) -> Option<Duration> {
        self.probes
            .iter()
            .filter(|p| p.receive_time.is_none())
            .map(|p| p.send_time + self.deadline)
            .max()
    }

    /// Closes the session. Samples come back in send order.
    pub fn finish(self) -> Vec<ProbeSample> {
        self.probes
            .into_iter()
            .enumerate()
            .map(|(seq, probe)| match probe.receive_time {
                Some(receive_time) => ProbeSample {
                    sequence_number: seq as u64,
                    send_time: probe.send_time,
                    receive_time: Some(receive_time),
                },
                None => ProbeSample::lost(seq as u64, probe.send_time),
            })
            .collect()
    }
}
