use crate::domain::{CommandOutput, CommandRunner, Invocation};
use crate::error::{Error, Result};
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::debug;

const WAIT_STEP: Duration = Duration::from_millis(50);

/// Runs commands on the host, blocking until exit or until the
/// invocation's execution timeout, in which case the child is killed.
#[derive(Debug, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        debug!("running {}", invocation.display_line());

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command.envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        if let Some(dir) = &invocation.current_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| Error::Spawn {
            program: invocation.program.clone(),
            source,
        })?;

        // Drain both pipes on their own threads so a chatty child cannot
        // fill one buffer while we block on the other.
        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        let status = match invocation.timeout {
            Some(limit) => wait_with_deadline(&mut child, limit, &invocation.program)?,
            None => child.wait().map_err(|source| Error::Spawn {
                program: invocation.program.clone(),
                source,
            })?,
        };

        Ok(CommandOutput {
            code: status.code().unwrap_or(-1),
            stdout: join_reader(stdout),
            stderr: join_reader(stderr),
        })
    }
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = pipe.read_to_end(&mut buffer);
            String::from_utf8_lossy(&buffer).into_owned()
        })
    })
}

fn join_reader(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

fn wait_with_deadline(child: &mut Child, limit: Duration, program: &str) -> Result<ExitStatus> {
    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait().map_err(|source| Error::Spawn {
            program: program.to_string(),
            source,
        })? {
            return Ok(status);
        }
        if started.elapsed() >= limit {
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::CommandTimeout {
                program: program.to_string(),
                timeout: limit,
            });
        }
        std::thread::sleep(WAIT_STEP);
    }
}
