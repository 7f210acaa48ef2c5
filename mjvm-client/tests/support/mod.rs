// Scriptable stand-in for an MJVM device listening on localhost

#![allow(dead_code)]

use bytes::BufMut;
use mjvm_client::classfile::{ClassFile, CLASS_MAGIC};
use mjvm_client::commands::{opcodes, status_bits};
use mjvm_client::constant_pool::{ConstantPool, ConstantPoolEntry};
use mjvm_client::method::{CodeAttribute, LineNumberEntry, MethodInfo};
use mjvm_client::{DebuggerConfig, LineResolver, MjvmDebugger};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub const SOURCE: &str = "demo/Blink.java";

#[derive(Debug)]
pub struct DeviceModel {
    pub status: u8,
    pub pc: u32,
    /// pc after each SINGLE_STEP; the pc stays put once exhausted
    pub step_pcs: VecDeque<u32>,
    pub class_name: String,
    pub method_name: String,
    pub descriptor: String,
    /// Every request received, in order
    pub log: Vec<Vec<u8>>,
    /// Swallow requests without answering
    pub silent: bool,
    /// Answer this opcode with a non-zero status
    pub reject: Option<u8>,
    /// Drop the connection on receiving this opcode
    pub close_on: Option<u8>,
    /// A second request arrived before the first was answered
    pub overlapped: bool,
    pub reply_delay: Duration,
}

impl Default for DeviceModel {
    fn default() -> Self {
        Self {
            status: status_bits::STOP | status_bits::HIT_BREAKPOINT,
            pc: 0,
            step_pcs: VecDeque::new(),
            class_name: "demo/Blink".to_string(),
            method_name: "main".to_string(),
            descriptor: "([Ljava/lang/String;)V".to_string(),
            log: Vec::new(),
            silent: false,
            reject: None,
            close_on: None,
            overlapped: false,
            reply_delay: Duration::from_millis(2),
        }
    }
}

enum Action {
    Reply(Vec<u8>),
    Silent,
    Close,
}

impl DeviceModel {
    fn handle(&mut self, request: &[u8]) -> Action {
        self.log.push(request.to_vec());
        let Some(&opcode) = request.first() else {
            return Action::Silent;
        };
        if self.close_on == Some(opcode) {
            return Action::Close;
        }
        if self.silent {
            return Action::Silent;
        }
        if self.reject == Some(opcode) {
            return Action::Reply(vec![opcode, 1]);
        }

        let mut reply = vec![opcode, 0];
        match opcode {
            opcodes::READ_STATUS => reply.put_u8(self.status),
            opcodes::READ_STACK_TRACE => {
                let index = u32::from_le_bytes([request[1], request[2], request[3], request[4]]);
                reply.put_u32_le(index);
                reply.put_u32_le(self.pc);
                for value in [&self.class_name, &self.method_name, &self.descriptor] {
                    reply.put_u16_le(value.len() as u16);
                    reply.put_u16_le(0);
                    reply.put_slice(value.as_bytes());
                    reply.put_u8(0);
                }
            }
            opcodes::RUN => self.status = 0,
            opcodes::STOP => self.status |= status_bits::STOP,
            opcodes::SINGLE_STEP => {
                if let Some(pc) = self.step_pcs.pop_front() {
                    self.pc = pc;
                }
            }
            _ => {}
        }
        Action::Reply(reply)
    }

    pub fn requests(&self, opcode: u8) -> Vec<Vec<u8>> {
        self.log
            .iter()
            .filter(|r| r.first() == Some(&opcode))
            .cloned()
            .collect()
    }
}

pub struct MockDevice {
    pub port: u16,
    pub model: Arc<Mutex<DeviceModel>>,
    task: JoinHandle<()>,
}

impl MockDevice {
    pub async fn start(model: DeviceModel) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let model = Arc::new(Mutex::new(model));

        let shared = model.clone();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, shared.clone()));
            }
        });

        Self { port, model, task }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut DeviceModel) -> R) -> R {
        f(&mut self.model.lock().unwrap())
    }

    pub fn requests(&self, opcode: u8) -> Vec<Vec<u8>> {
        self.with(|m| m.requests(opcode))
    }

    pub fn config(&self) -> DebuggerConfig {
        DebuggerConfig {
            port: self.port,
            response_timeout_ms: 500,
            ..DebuggerConfig::default()
        }
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(mut stream: TcpStream, model: Arc<Mutex<DeviceModel>>) {
    let mut buf = vec![0u8; 1024];
    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        let (action, delay) = {
            let mut model = model.lock().unwrap();
            (model.handle(&buf[..n]), model.reply_delay)
        };

        match action {
            Action::Reply(reply) => {
                tokio::time::sleep(delay).await;
                let mut extra = [0u8; 64];
                if let Ok(n) = stream.try_read(&mut extra) {
                    if n > 0 {
                        model.lock().unwrap().overlapped = true;
                    }
                }
                if stream.write_all(&reply).await.is_err() {
                    return;
                }
            }
            Action::Silent => {}
            Action::Close => return,
        }
    }
}

fn method(name: &str, descriptor: &str, lines: &[(u16, u16)]) -> MethodInfo {
    let line_numbers = lines
        .iter()
        .map(|&(start_pc, line_number)| LineNumberEntry {
            start_pc,
            line_number,
        })
        .collect();
    MethodInfo::new(
        name,
        descriptor,
        Some(CodeAttribute {
            max_stack: 2,
            max_locals: 1,
            code: vec![0; 24],
            line_numbers: Some(line_numbers),
        }),
    )
}

/// `demo/Blink` with `main` on lines 5-8 and `toggle` on lines 12-13
pub fn blink_class() -> ClassFile {
    ClassFile {
        magic: CLASS_MAGIC,
        minor_version: 0,
        major_version: 52,
        constant_pool: ConstantPool::from_entries(vec![
            ConstantPoolEntry::Utf8("demo/Blink".to_string()),
            ConstantPoolEntry::Class { name_index: 1 },
        ]),
        access_flags: 0x21,
        this_class: 2,
        super_class: 0,
        interfaces_count: 0,
        methods: vec![
            method(
                "main",
                "([Ljava/lang/String;)V",
                &[(0, 5), (4, 6), (8, 7), (12, 8)],
            ),
            method("toggle", "(I)V", &[(0, 12), (6, 13)]),
        ],
    }
}

pub fn resolver() -> LineResolver {
    let mut resolver = LineResolver::new();
    resolver.add_class(blink_class()).unwrap();
    resolver
}

/// Route client logs through the test harness; `RUST_LOG=mjvm_client=debug` to see them
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub async fn connected(device: &MockDevice) -> MjvmDebugger {
    init_tracing();
    let mut debugger = MjvmDebugger::new(device.config(), resolver());
    debugger.connect().await.unwrap();
    debugger
}

/// Breakpoint pc carried by an ADD/REMOVE request
pub fn request_pc(request: &[u8]) -> u32 {
    u32::from_le_bytes([request[1], request[2], request[3], request[4]])
}
