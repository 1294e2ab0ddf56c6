//! Shared test support: tracing setup and an in-process mock Modbus TCP
//! server for transport integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Once};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;

static TRACING: Once = Once::new();

/// Install a tracing subscriber once per test binary; `RUST_LOG` controls
/// verbosity, output goes through the libtest capture.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

/// One observed request: function code, start address, count (or value for
/// FC6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservedRequest {
    pub function: u8,
    pub address: u16,
    pub count: u16,
}

pub struct MockModbusServer {
    addr: SocketAddr,
    holding_registers: Arc<RwLock<HashMap<u16, u16>>>,
    input_registers: Arc<RwLock<HashMap<u16, u16>>>,
    /// Addresses answered with an illegal-data-address exception.
    illegal_addresses: Arc<RwLock<HashSet<u16>>>,
    /// Requests to swallow without responding (forces a client timeout).
    skip_responses: Arc<AtomicU32>,
    request_log: Arc<RwLock<Vec<ObservedRequest>>>,
}

impl MockModbusServer {
    /// Bind on an ephemeral localhost port and start serving.
    pub async fn start() -> Arc<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock server");
        let addr = listener.local_addr().expect("local addr");
        let server = Arc::new(Self {
            addr,
            holding_registers: Arc::new(RwLock::new(HashMap::new())),
            input_registers: Arc::new(RwLock::new(HashMap::new())),
            illegal_addresses: Arc::new(RwLock::new(HashSet::new())),
            skip_responses: Arc::new(AtomicU32::new(0)),
            request_log: Arc::new(RwLock::new(Vec::new())),
        });

        let accept_server = Arc::clone(&server);
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _)) => {
                        let server = Arc::clone(&accept_server);
                        tokio::spawn(async move {
                            let _ = server.handle_connection(stream).await;
                        });
                    }
                    Err(_) => break,
                }
            }
        });
        server
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub async fn set_input_registers(&self, start: u16, values: &[u16]) {
        let mut registers = self.input_registers.write().await;
        for (i, &value) in values.iter().enumerate() {
            registers.insert(start + i as u16, value);
        }
    }

    pub async fn set_holding_registers(&self, start: u16, values: &[u16]) {
        let mut registers = self.holding_registers.write().await;
        for (i, &value) in values.iter().enumerate() {
            registers.insert(start + i as u16, value);
        }
    }

    pub async fn get_holding_register(&self, address: u16) -> Option<u16> {
        self.holding_registers.read().await.get(&address).copied()
    }

    pub async fn mark_illegal(&self, address: u16) {
        self.illegal_addresses.write().await.insert(address);
    }

    /// Swallow the next `count` requests without answering.
    pub fn skip_next_responses(&self, count: u32) {
        self.skip_responses.store(count, Ordering::SeqCst);
    }

    pub async fn requests(&self) -> Vec<ObservedRequest> {
        self.request_log.read().await.clone()
    }

    pub async fn clear_requests(&self) {
        self.request_log.write().await.clear();
    }

    /// Seed the holding windows discovery reads: device-type code at 19,
    /// firmware at 7-10, serial at 115-119.
    pub async fn seed_identity(&self, device_type_code: u16, serial: &str, firmware: &str) {
        self.set_holding_registers(19, &[device_type_code]).await;
        self.set_holding_registers(7, &ascii_words(firmware, 4)).await;
        self.set_holding_registers(115, &ascii_words(serial, 5)).await;
    }

    async fn handle_connection(&self, mut stream: TcpStream) -> std::io::Result<()> {
        let mut header = [0u8; 8];
        loop {
            if stream.read_exact(&mut header).await.is_err() {
                return Ok(()); // connection closed
            }

            let transaction_id = u16::from_be_bytes([header[0], header[1]]);
            let length = u16::from_be_bytes([header[4], header[5]]) as usize;
            let unit_id = header[6];
            let function = header[7];

            // length counts unit id + function + payload
            let mut payload = vec![0u8; length.saturating_sub(2)];
            stream.read_exact(&mut payload).await?;

            if let Some(observed) = observe(function, &payload) {
                self.request_log.write().await.push(observed);
            }

            if self.skip_responses.load(Ordering::SeqCst) > 0 {
                self.skip_responses.fetch_sub(1, Ordering::SeqCst);
                continue; // no response: the client times out and retries
            }

            let pdu = self.build_response(function, &payload).await;
            let mut response = Vec::with_capacity(8 + pdu.len());
            response.extend_from_slice(&transaction_id.to_be_bytes());
            response.extend_from_slice(&[0, 0]); // protocol id
            response.extend_from_slice(&((pdu.len() as u16 + 1).to_be_bytes()));
            response.push(unit_id);
            response.extend_from_slice(&pdu);
            stream.write_all(&response).await?;
        }
    }

    /// Build the function-code + payload part of the response.
    async fn build_response(&self, function: u8, payload: &[u8]) -> Vec<u8> {
        match function {
            0x03 | 0x04 => {
                if payload.len() < 4 {
                    return exception(function, 0x03);
                }
                let start = u16::from_be_bytes([payload[0], payload[1]]);
                let count = u16::from_be_bytes([payload[2], payload[3]]);
                if count == 0 || count > 125 {
                    return exception(function, 0x03);
                }
                if self.illegal_addresses.read().await.contains(&start) {
                    return exception(function, 0x02);
                }
                let registers = if function == 0x03 {
                    self.holding_registers.read().await
                } else {
                    self.input_registers.read().await
                };
                let mut pdu = vec![function, (count * 2) as u8];
                for i in 0..count {
                    let value = registers.get(&(start + i)).copied().unwrap_or(0);
                    pdu.extend_from_slice(&value.to_be_bytes());
                }
                pdu
            }
            0x06 => {
                if payload.len() < 4 {
                    return exception(function, 0x03);
                }
                let address = u16::from_be_bytes([payload[0], payload[1]]);
                let value = u16::from_be_bytes([payload[2], payload[3]]);
                self.holding_registers.write().await.insert(address, value);
                let mut pdu = vec![function];
                pdu.extend_from_slice(&payload[0..4]);
                pdu
            }
            0x10 => {
                if payload.len() < 5 {
                    return exception(function, 0x03);
                }
                let start = u16::from_be_bytes([payload[0], payload[1]]);
                let count = u16::from_be_bytes([payload[2], payload[3]]);
                let byte_count = payload[4] as usize;
                if byte_count != count as usize * 2 || payload.len() < 5 + byte_count {
                    return exception(function, 0x03);
                }
                let mut registers = self.holding_registers.write().await;
                for i in 0..count as usize {
                    let value =
                        u16::from_be_bytes([payload[5 + i * 2], payload[6 + i * 2]]);
                    registers.insert(start + i as u16, value);
                }
                let mut pdu = vec![function];
                pdu.extend_from_slice(&payload[0..4]);
                pdu
            }
            _ => exception(function, 0x01),
        }
    }
}

fn exception(function: u8, code: u8) -> Vec<u8> {
    vec![function | 0x80, code]
}

fn observe(function: u8, payload: &[u8]) -> Option<ObservedRequest> {
    if payload.len() < 4 {
        return None;
    }
    Some(ObservedRequest {
        function,
        address: u16::from_be_bytes([payload[0], payload[1]]),
        count: u16::from_be_bytes([payload[2], payload[3]]),
    })
}

/// Pack ASCII text into register words, two chars per word, low byte first,
/// NUL-padded to `words` registers.
pub fn ascii_words(text: &str, words: usize) -> Vec<u16> {
    let bytes = text.as_bytes();
    (0..words)
        .map(|i| {
            let low = bytes.get(i * 2).copied().unwrap_or(0) as u16;
            let high = bytes.get(i * 2 + 1).copied().unwrap_or(0) as u16;
            low | (high << 8)
        })
        .collect()
}
