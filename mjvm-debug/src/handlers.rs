// Front-end request handlers
//
// Maps each command onto the debugger session

use crate::protocol::*;
use mjvm_client::{ConnectionState, MjvmDebugger, RunState};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::path::Path;
use tracing::{debug, warn};

pub struct RequestHandler {
    debugger: MjvmDebugger,
}

impl RequestHandler {
    pub fn new(debugger: MjvmDebugger) -> Self {
        Self { debugger }
    }

    pub async fn handle_request(&mut self, request: Request) -> Response {
        debug!("Handling {}", request.command);
        let args = request.arguments;

        let result = match request.command.as_str() {
            "loadClasses" => self.handle_load_classes(args),
            "connect" => self.handle_connect().await,
            "disconnect" => self.handle_disconnect().await,
            "continue" => self.handle_continue().await,
            "pause" => self.handle_pause().await,
            "stepIn" => self.handle_step_in().await,
            "setBreakpoints" => self.handle_set_breakpoints(args).await,
            "removeAllBreakpoints" => self.handle_remove_all_breakpoints().await,
            "stackTrace" => self.handle_stack_trace().await,
            "status" => Ok(self.status_body()),
            other => Err(format!("Unknown command: {}", other)),
        };

        match result {
            Ok(body) => Response::ok(request.id, body),
            Err(message) => {
                warn!("{} failed: {}", request.command, message);
                Response::error(request.id, message)
            }
        }
    }

    /// Stop the session before exiting
    pub async fn shutdown(&mut self) {
        self.debugger.disconnect().await;
    }

    fn handle_load_classes(&mut self, args: Value) -> Result<Value, String> {
        let args: LoadClassesArguments = parse_args(args)?;
        let path = Path::new(&args.path);
        let resolver = self.debugger.resolver_mut();

        let loaded = if path.is_dir() {
            resolver.load_class_dir(path)
        } else {
            resolver
                .load_class_file(path)
                .map_err(|e| format!("Failed to load {}: {}", path.display(), e))?;
            1
        };

        Ok(json!({
            "loaded": loaded,
            "classes": resolver.class_count(),
        }))
    }

    async fn handle_connect(&mut self) -> Result<Value, String> {
        self.debugger
            .connect()
            .await
            .map_err(|e| format!("Failed to connect: {}", e))?;
        Ok(self.status_body())
    }

    async fn handle_disconnect(&mut self) -> Result<Value, String> {
        self.debugger.disconnect().await;
        Ok(Value::Null)
    }

    async fn handle_continue(&mut self) -> Result<Value, String> {
        self.debugger.run().await.map_err(|e| e.to_string())?;
        Ok(Value::Null)
    }

    async fn handle_pause(&mut self) -> Result<Value, String> {
        self.debugger.stop().await.map_err(|e| e.to_string())?;
        Ok(Value::Null)
    }

    async fn handle_step_in(&mut self) -> Result<Value, String> {
        let frame = self.debugger.step_in().await.map_err(|e| e.to_string())?;
        serde_json::to_value(frame).map_err(|e| e.to_string())
    }

    async fn handle_set_breakpoints(&mut self, args: Value) -> Result<Value, String> {
        let args: SetBreakpointsArguments = parse_args(args)?;
        let update = self
            .debugger
            .set_breakpoints(&args.lines, &args.source)
            .await
            .map_err(|e| e.to_string())?;

        let breakpoints: Vec<&mjvm_client::DebugLineInfo> = self
            .debugger
            .breakpoints()
            .iter()
            .filter(|bp| bp.source_path == args.source)
            .collect();

        Ok(json!({
            "added": update.added,
            "removed": update.removed,
            "breakpoints": breakpoints,
        }))
    }

    async fn handle_remove_all_breakpoints(&mut self) -> Result<Value, String> {
        self.debugger
            .remove_all_breakpoints()
            .await
            .map_err(|e| e.to_string())?;
        Ok(Value::Null)
    }

    async fn handle_stack_trace(&mut self) -> Result<Value, String> {
        let frames = self.debugger.stack_frames().await.map_err(|e| e.to_string())?;
        let total = frames.len();
        Ok(json!({
            "stackFrames": frames,
            "totalFrames": total,
        }))
    }

    fn status_body(&self) -> Value {
        let state = match self.debugger.state() {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connected(RunState::Running) => "running",
            ConnectionState::Connected(RunState::Stopped { .. }) => "stopped",
        };
        let status = self.debugger.status();

        json!({
            "state": state,
            "stopped": status.is_stopped(),
            "hitBreakpoint": status.hit_breakpoint(),
            "singleStep": status.single_step(),
            "breakpoints": self.debugger.breakpoints().len(),
            "classes": self.debugger.resolver().class_count(),
        })
    }
}

fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, String> {
    serde_json::from_value(args).map_err(|e| format!("Invalid arguments: {}", e))
}
