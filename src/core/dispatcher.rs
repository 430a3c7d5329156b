// src/core/dispatcher.rs — Command dispatcher: the request/response loop
//
// Reads one request line, handles it to completion, writes exactly one
// response line, then reads the next. Per-request failures become
// `success: false` responses; only an unparsable line ends the loop early.

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite};

use crate::core::cache::{BuildCache, WorkerStatus};
use crate::infra::errors::ToolError;
use crate::problems::{Evaluation, ModuleRegistry, PREPARE};
use crate::protocol::{codec, Request, Response, Timing};
use crate::worker::Builder;

/// Static adapter identity reported on `start`.
#[derive(Debug, Clone)]
pub struct ToolIdentity {
    pub tool: String,
    pub config: Option<Value>,
}

pub struct Dispatcher {
    identity: ToolIdentity,
    cache: BuildCache,
    registry: ModuleRegistry,
}

impl Dispatcher {
    pub fn new(identity: ToolIdentity, builder: Box<dyn Builder>, registry: ModuleRegistry) -> Self {
        Self {
            identity,
            cache: BuildCache::new(builder),
            registry,
        }
    }

    /// Serve requests until end of input, then stop every worker.
    ///
    /// A closed output pipe is treated as the reader going away and ends the
    /// loop successfully. Workers are stopped on every exit path.
    pub async fn serve<R, W>(&mut self, input: R, output: W) -> Result<(), ToolError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let result = self.run(input, output).await;
        self.shutdown().await;
        result
    }

    /// The request loop without the final shutdown.
    pub async fn run<R, W>(&mut self, input: R, mut output: W) -> Result<(), ToolError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let request = codec::decode(&line).inspect_err(|e| {
                tracing::error!("Unparsable request, closing connection: {}", e);
            })?;

            let response = self.handle(request).await;

            if let Err(e) = codec::write_response(&mut output, &response).await {
                if e.kind() == std::io::ErrorKind::BrokenPipe {
                    tracing::debug!("Output closed, stopping");
                    return Ok(());
                }
                return Err(e.into());
            }
        }
        tracing::debug!("End of input");
        Ok(())
    }

    /// Handle one request. Never fails: errors become failure responses.
    pub async fn handle(&mut self, request: Request) -> Response {
        match request {
            Request::Start { id } => {
                Response::start(id, self.identity.tool.clone(), self.identity.config.clone())
            }
            Request::Define { id, module } => match self.cache.ensure(&module).await {
                Ok(_) => Response::defined(id),
                Err(e) => Response::define_failed(id, e.diagnostic()),
            },
            Request::Evaluate {
                id,
                module,
                function,
                input,
            } => match self.evaluate(&module, &function, &input).await {
                Ok(eval) => {
                    let timings = eval.times.into_iter().map(Timing::evaluate).collect();
                    Response::evaluated(id, eval.output, timings)
                }
                Err(e) => {
                    if e.breaks_channel() {
                        self.cache.mark_broken(&module, &e.diagnostic()).await;
                    } else {
                        tracing::debug!("Evaluate {}.{} failed: {}", module, function, e);
                    }
                    Response::evaluate_failed(id, e.diagnostic())
                }
            },
            Request::Other { id, kind } => {
                tracing::warn!("Ignoring message of unhandled kind '{}'", kind);
                Response::ack(id)
            }
        }
    }

    async fn evaluate(
        &mut self,
        module: &str,
        function: &str,
        input: &Value,
    ) -> Result<Evaluation, ToolError> {
        let channel = self.cache.channel(module)?;
        let prepare = self.registry.resolve(module, PREPARE)?;
        let target = self.registry.resolve(module, function)?;

        prepare.invoke(&mut *channel, input).await?;
        target.invoke(channel, input).await
    }

    /// Stop every live worker.
    pub async fn shutdown(&mut self) {
        let live = self.cache.live_pids();
        if !live.is_empty() {
            tracing::info!("Stopping {} worker(s)", live.len());
        }
        self.cache.shutdown_all().await;
    }

    pub fn status(&self, module: &str) -> WorkerStatus {
        self.cache.status(module)
    }

    pub fn worker_pid(&self, module: &str) -> Option<u32> {
        self.cache.pid(module)
    }

    pub fn live_pids(&self) -> Vec<u32> {
        self.cache.live_pids()
    }
}
