use crate::domain::{Clock, CommandOutput, CommandRunner, Invocation};
use crate::error::{Error, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

/// Scripted command runner recording every invocation.
///
/// Responses are queued per compose verb (`up`, `down`, `ps`, `logs`).
/// When a queue runs down to its last response, that response keeps being
/// returned, so a polling loop can observe a sequence that then sticks.
/// Verbs with no scripted response succeed with empty output.
#[derive(Debug, Default)]
pub struct MockRunner {
    invocations: RwLock<Vec<Invocation>>,
    responses: RwLock<HashMap<String, VecDeque<CommandOutput>>>,
    fail_on: RwLock<Option<String>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for a verb.
    pub fn push_response(&self, verb: &str, output: CommandOutput) {
        self.responses
            .write()
            .unwrap()
            .entry(verb.to_string())
            .or_default()
            .push_back(output);
    }

    /// Queue one successful `ps` response built from JSON lines.
    pub fn push_ps(&self, lines: &[String]) {
        self.push_response("ps", CommandOutput::ok(lines.join("\n")));
    }

    pub fn push_failure(&self, verb: &str, code: i32, stderr: &str) {
        self.push_response(verb, CommandOutput::failed(code, stderr));
    }

    /// Make the next invocation of `verb` fail at the spawn level.
    pub fn set_fail_on(&self, verb: &str) {
        *self.fail_on.write().unwrap() = Some(verb.to_string());
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.read().unwrap().clone()
    }

    /// Compose verbs in invocation order.
    pub fn verbs(&self) -> Vec<String> {
        self.invocations
            .read()
            .unwrap()
            .iter()
            .map(|invocation| verb_of(invocation))
            .collect()
    }

    pub fn count(&self, verb: &str) -> usize {
        self.verbs().iter().filter(|v| *v == verb).count()
    }
}

fn verb_of(invocation: &Invocation) -> String {
    invocation
        .args
        .iter()
        .find(|arg| matches!(arg.as_str(), "up" | "down" | "ps" | "logs"))
        .cloned()
        .unwrap_or_default()
}

impl CommandRunner for MockRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        self.invocations.write().unwrap().push(invocation.clone());
        let verb = verb_of(invocation);

        if let Some(fail_on) = &*self.fail_on.read().unwrap() {
            if *fail_on == verb {
                return Err(Error::Spawn {
                    program: invocation.program.clone(),
                    source: std::io::Error::other("scripted spawn failure"),
                });
            }
        }

        let mut responses = self.responses.write().unwrap();
        let output = match responses.get_mut(&verb) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        Ok(output.unwrap_or_else(|| CommandOutput::ok("")))
    }
}

/// One `ps --format json` line for a service in the given state.
pub fn ps_line(service: &str, state: &str, health: &str) -> String {
    format!(
        r#"{{"ID":"{service}-1","Name":"proj-{service}-1","Service":"{service}","State":"{state}","Health":"{health}","Publishers":[]}}"#
    )
}

/// Virtual clock: sleeping advances time instead of blocking, so polling
/// loops run instantly while still observing elapsed time and intervals.
#[derive(Debug)]
pub struct MockClock {
    start: Instant,
    elapsed: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Every duration passed to `sleep`, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    /// Move virtual time forward without recording a sleep.
    pub fn advance(&self, duration: Duration) {
        *self.elapsed.lock().unwrap() += duration;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + *self.elapsed.lock().unwrap()
    }

    fn sleep(&self, duration: Duration) {
        *self.elapsed.lock().unwrap() += duration;
        self.sleeps.lock().unwrap().push(duration);
    }
}
