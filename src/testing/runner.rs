//! [`ProcessRunner`] that replays scripts instead of launching programs

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::{oneshot, Notify};

use crate::core::error::AppError;
use crate::core::process::{ExitHandle, ProcessOutput, ProcessRunner, SpawnedProcess};
use crate::testing::script::RunScript;

/// Pipe buffer of the fake child; small so writers wait on readers like real pipes
const PIPE_CAPACITY: usize = 64;

/// Answer to the metadata-only (`--get-title`) invocation
#[derive(Debug, Clone, PartialEq)]
pub enum TitleResponse {
    Title(String),
    Fail { code: i32, stderr: String },
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Value following `--output` in an argument list
fn output_arg(args: &[String]) -> Option<PathBuf> {
    args.iter()
        .position(|a| a == "--output")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
}

pub struct ScriptedRunner {
    title: Mutex<TitleResponse>,
    downloads: Mutex<VecDeque<RunScript>>,
    spawned: Mutex<Vec<Vec<String>>>,
    lookups: Mutex<Vec<Vec<String>>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl Default for ScriptedRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self {
            title: Mutex::new(TitleResponse::Title("Scripted Video".to_string())),
            downloads: Mutex::new(VecDeque::new()),
            spawned: Mutex::new(Vec::new()),
            lookups: Mutex::new(Vec::new()),
            gate: Mutex::new(None),
        }
    }

    pub fn with_title(self, title: &str) -> Self {
        self.set_title(TitleResponse::Title(title.to_string()));
        self
    }

    pub fn with_title_failure(self, code: i32, stderr: &str) -> Self {
        self.set_title(TitleResponse::Fail {
            code,
            stderr: stderr.to_string(),
        });
        self
    }

    pub fn set_title(&self, response: TitleResponse) {
        *lock(&self.title) = response;
    }

    /// Queues the script for the next `spawn`
    pub fn push_download(&self, script: RunScript) {
        lock(&self.downloads).push_back(script);
    }

    /// Makes every later scripted process wait before exiting until the
    /// returned handle is notified (once per process).
    pub fn hold_exits(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *lock(&self.gate) = Some(Arc::clone(&notify));
        notify
    }

    /// Arguments of every `spawn` call so far
    pub fn spawned_args(&self) -> Vec<Vec<String>> {
        lock(&self.spawned).clone()
    }

    /// Arguments of every `output` call so far
    pub fn lookup_args(&self) -> Vec<Vec<String>> {
        lock(&self.lookups).clone()
    }
}

async fn write_chunks(mut pipe: DuplexStream, data: &[u8], chunk_size: usize) {
    for piece in data.chunks(chunk_size.max(1)) {
        if pipe.write_all(piece).await.is_err() {
            // reader is gone
            return;
        }
    }
}

async fn play(
    script: RunScript,
    output_path: Option<PathBuf>,
    stdout: DuplexStream,
    stderr: DuplexStream,
    gate: Option<Arc<Notify>>,
    exit_tx: oneshot::Sender<Option<i32>>,
) {
    if script.stderr_first {
        write_chunks(stderr, script.stderr.as_bytes(), script.chunk_size).await;
        write_chunks(stdout, script.stdout.as_bytes(), script.chunk_size).await;
    } else {
        tokio::join!(
            write_chunks(stdout, script.stdout.as_bytes(), script.chunk_size),
            write_chunks(stderr, script.stderr.as_bytes(), script.chunk_size),
        );
    }

    if let (Some(bytes), Some(path)) = (script.output_bytes, output_path) {
        if let Err(e) = tokio::fs::write(&path, vec![0u8; bytes as usize]).await {
            log::warn!("Scripted run '{}' could not create {}: {}", script.name, path.display(), e);
        }
    }

    if let Some(gate) = gate {
        gate.notified().await;
    }
    let _ = exit_tx.send(script.exit_code);
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn spawn(&self, program: &str, args: &[String]) -> Result<SpawnedProcess, AppError> {
        lock(&self.spawned).push(args.to_vec());

        let script = lock(&self.downloads)
            .pop_front()
            .ok_or_else(|| AppError::Download(format!("No scripted run queued for '{}'", program)))?;

        if let Some(message) = &script.spawn_error {
            return Err(AppError::Download(format!("Failed to start '{}': {}", program, message)));
        }

        let (stdout_reader, stdout_writer) = tokio::io::duplex(PIPE_CAPACITY);
        let (stderr_reader, stderr_writer) = tokio::io::duplex(PIPE_CAPACITY);
        let (exit_tx, exit_rx) = oneshot::channel();
        let gate = lock(&self.gate).clone();

        tokio::spawn(play(
            script,
            output_arg(args),
            stdout_writer,
            stderr_writer,
            gate,
            exit_tx,
        ));

        Ok(SpawnedProcess {
            stdout: Box::new(stdout_reader),
            stderr: Box::new(stderr_reader),
            exit: ExitHandle::new(async move {
                exit_rx
                    .await
                    .map_err(|_| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "scripted process vanished"))
            }),
        })
    }

    async fn output(&self, _program: &str, args: &[String]) -> Result<ProcessOutput, AppError> {
        lock(&self.lookups).push(args.to_vec());

        if args.iter().any(|a| a == "--version") {
            return Ok(ProcessOutput {
                code: Some(0),
                stdout: b"2024.12.06\n".to_vec(),
                stderr: Vec::new(),
            });
        }

        let response = lock(&self.title).clone();
        Ok(match response {
            TitleResponse::Title(title) => ProcessOutput {
                code: Some(0),
                stdout: format!("{}\n", title).into_bytes(),
                stderr: Vec::new(),
            },
            TitleResponse::Fail { code, stderr } => ProcessOutput {
                code: Some(code),
                stdout: Vec::new(),
                stderr: stderr.into_bytes(),
            },
        })
    }
}
