//! WiFi dongle transport on TCP/8000.
//!
//! The datalogger bridges the inverter's RS-485 bus to TCP with a
//! proprietary framed protocol. Frames carry both the dongle serial (which
//! datalogger) and the inverter serial (which device behind it); once the
//! framing is stripped the register semantics are identical to Modbus, so
//! the same register maps and decoders apply.
//!
//! The dongle accepts exactly ONE concurrent TCP connection; a second client
//! desyncs the stream. Disable other integrations before connecting. Recent
//! dongle firmware may block port 8000 entirely.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock as SyncRwLock;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, warn};

use crate::data::{BatteryBankData, InverterEnergyData, InverterRuntimeData, MidboxRuntimeData};
use crate::error::{Error, Result};
use crate::registers::gridboss::{self, MIDBOX_REGISTER_GROUPS};
use crate::registers::{
    InverterFamily, RawRegisters, BATTERY_MODULE_BASE_ADDRESS, BATTERY_MODULE_MAX_COUNT,
    BATTERY_MODULE_WORDS, ENERGY_PRIMARY_GROUPS, ENERGY_SUPPLEMENTARY_GROUP,
    INPUT_REGISTER_GROUPS, MAX_REGISTERS_PER_READ, NO_BATTERY_VOLTAGE_THRESHOLD,
};
use crate::transport::discovery::{self, RegisterIo};
use crate::transport::{
    coalesce_writes, DeviceIdentity, ParameterUpdates, ParameterValues, Transport,
    TransportCapabilities,
};

use frame::{DeviceFunction, TranslatedMessage, TranslatedPayload};

pub const DEFAULT_PORT: u16 = 8000;
const MAX_INTER_GROUP_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 3;
/// How many non-matching frames (heartbeats, stale replies) to skip while
/// waiting for the reply to an exchange.
const MAX_SKIPPED_FRAMES: u32 = 8;

/// Byte-level frame codec for the dongle stream protocol.
pub mod frame {
    use byteorder::{ByteOrder, LittleEndian};
    use tokio::io::{AsyncRead, AsyncReadExt};

    use crate::error::{Error, Result};

    pub const PREFIX: [u8; 2] = [0xA1, 0x1A];
    pub const PROTOCOL_VERSION: u16 = 2;
    pub const TCP_FUNCTION_HEARTBEAT: u8 = 0xC1;
    pub const TCP_FUNCTION_TRANSLATED: u8 = 0xC2;

    const SERIAL_LEN: usize = 10;
    /// address byte + device function + serial + register
    const BODY_HEADER_LEN: usize = 2 + SERIAL_LEN + 2;

    /// Modbus-style function selector tunnelled through the dongle.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[repr(u8)]
    pub enum DeviceFunction {
        ReadHold = 0x03,
        ReadInput = 0x04,
        WriteSingle = 0x06,
        WriteMulti = 0x10,
    }

    impl DeviceFunction {
        pub fn from_byte(byte: u8) -> Option<Self> {
            match byte {
                0x03 => Some(DeviceFunction::ReadHold),
                0x04 => Some(DeviceFunction::ReadInput),
                0x06 => Some(DeviceFunction::WriteSingle),
                0x10 => Some(DeviceFunction::WriteMulti),
                _ => None,
            }
        }
    }

    /// CRC-16/MODBUS over the translated-data body.
    pub fn crc16(data: &[u8]) -> u16 {
        let mut crc: u16 = 0xFFFF;
        for &byte in data {
            crc ^= u16::from(byte);
            for _ in 0..8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xA001;
                } else {
                    crc >>= 1;
                }
            }
        }
        crc
    }

    /// One frame off the wire, header already validated.
    #[derive(Debug, Clone)]
    pub struct Frame {
        pub protocol: u16,
        pub tcp_function: u8,
        pub datalog: String,
        pub data: Vec<u8>,
        /// Complete frame bytes, for heartbeat echo.
        pub raw: Vec<u8>,
    }

    /// Parsed translated-data payload.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum TranslatedPayload {
        /// Read request: number of registers wanted.
        ReadRequest { count: u16 },
        /// Read reply: register values.
        Values(Vec<u16>),
        /// Write-single request or its echo.
        SingleValue(u16),
        /// Write-multi request payload.
        WriteValues(Vec<u16>),
        /// Write-multi acknowledgement: registers written.
        WriteAck { count: u16 },
    }

    /// A translated-data message in either direction.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct TranslatedMessage {
        pub is_reply: bool,
        pub device_function: DeviceFunction,
        pub inverter: String,
        pub register: u16,
        pub payload: TranslatedPayload,
    }

    fn serial_bytes(serial: &str) -> Result<[u8; SERIAL_LEN]> {
        let bytes = serial.as_bytes();
        if bytes.len() != SERIAL_LEN || !bytes.iter().all(u8::is_ascii) {
            return Err(Error::config(format!(
                "serial must be exactly {SERIAL_LEN} ASCII characters, got {serial:?}"
            )));
        }
        let mut out = [0u8; SERIAL_LEN];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn encode_frame(tcp_function: u8, datalog: &[u8; SERIAL_LEN], data: &[u8]) -> Vec<u8> {
        let mut rest = Vec::with_capacity(14 + data.len());
        rest.push(0x01);
        rest.push(tcp_function);
        rest.extend_from_slice(datalog);
        let mut len_buf = [0u8; 2];
        LittleEndian::write_u16(&mut len_buf, data.len() as u16);
        rest.extend_from_slice(&len_buf);
        rest.extend_from_slice(data);

        let mut out = Vec::with_capacity(6 + rest.len());
        out.extend_from_slice(&PREFIX);
        let mut word = [0u8; 2];
        LittleEndian::write_u16(&mut word, PROTOCOL_VERSION);
        out.extend_from_slice(&word);
        LittleEndian::write_u16(&mut word, rest.len() as u16);
        out.extend_from_slice(&word);
        out.extend_from_slice(&rest);
        out
    }

    fn encode_translated(
        datalog: &str,
        inverter: &str,
        function: DeviceFunction,
        register: u16,
        is_reply: bool,
        tail: &[u8],
    ) -> Result<Vec<u8>> {
        let datalog = serial_bytes(datalog)?;
        let inverter = serial_bytes(inverter)?;

        let mut body = Vec::with_capacity(BODY_HEADER_LEN + tail.len());
        body.push(u8::from(is_reply));
        body.push(function as u8);
        body.extend_from_slice(&inverter);
        let mut word = [0u8; 2];
        LittleEndian::write_u16(&mut word, register);
        body.extend_from_slice(&word);
        body.extend_from_slice(tail);

        let crc = crc16(&body);
        LittleEndian::write_u16(&mut word, crc);
        body.extend_from_slice(&word);

        Ok(encode_frame(TCP_FUNCTION_TRANSLATED, &datalog, &body))
    }

    /// Encode a read request (FC3/FC4 equivalent).
    pub fn encode_read(
        datalog: &str,
        inverter: &str,
        function: DeviceFunction,
        register: u16,
        count: u16,
    ) -> Result<Vec<u8>> {
        let mut tail = [0u8; 2];
        LittleEndian::write_u16(&mut tail, count);
        encode_translated(datalog, inverter, function, register, false, &tail)
    }

    /// Encode a single-register write (FC6 equivalent).
    pub fn encode_write_single(
        datalog: &str,
        inverter: &str,
        register: u16,
        value: u16,
    ) -> Result<Vec<u8>> {
        let mut tail = [0u8; 2];
        LittleEndian::write_u16(&mut tail, value);
        encode_translated(datalog, inverter, DeviceFunction::WriteSingle, register, false, &tail)
    }

    /// Encode a multi-register write (FC16 equivalent).
    pub fn encode_write_multi(
        datalog: &str,
        inverter: &str,
        register: u16,
        values: &[u16],
    ) -> Result<Vec<u8>> {
        let mut tail = Vec::with_capacity(3 + values.len() * 2);
        let mut word = [0u8; 2];
        LittleEndian::write_u16(&mut word, values.len() as u16);
        tail.extend_from_slice(&word);
        tail.push((values.len() * 2) as u8);
        for &value in values {
            LittleEndian::write_u16(&mut word, value);
            tail.extend_from_slice(&word);
        }
        encode_translated(datalog, inverter, DeviceFunction::WriteMulti, register, false, &tail)
    }

    /// Encode a read reply as the dongle would send it (used by tests and
    /// protocol tooling).
    pub fn encode_read_reply(
        datalog: &str,
        inverter: &str,
        function: DeviceFunction,
        register: u16,
        values: &[u16],
    ) -> Result<Vec<u8>> {
        let mut tail = Vec::with_capacity(1 + values.len() * 2);
        tail.push((values.len() * 2) as u8);
        let mut word = [0u8; 2];
        for &value in values {
            LittleEndian::write_u16(&mut word, value);
            tail.extend_from_slice(&word);
        }
        encode_translated(datalog, inverter, function, register, true, &tail)
    }

    /// Encode a write-single echo reply.
    pub fn encode_write_single_reply(
        datalog: &str,
        inverter: &str,
        register: u16,
        value: u16,
    ) -> Result<Vec<u8>> {
        let mut tail = [0u8; 2];
        LittleEndian::write_u16(&mut tail, value);
        encode_translated(datalog, inverter, DeviceFunction::WriteSingle, register, true, &tail)
    }

    /// Encode a write-multi acknowledgement.
    pub fn encode_write_multi_reply(
        datalog: &str,
        inverter: &str,
        register: u16,
        count: u16,
    ) -> Result<Vec<u8>> {
        let mut tail = [0u8; 2];
        LittleEndian::write_u16(&mut tail, count);
        encode_translated(datalog, inverter, DeviceFunction::WriteMulti, register, true, &tail)
    }

    /// Encode a heartbeat frame as the dongle emits it.
    pub fn encode_heartbeat(datalog: &str) -> Result<Vec<u8>> {
        let datalog = serial_bytes(datalog)?;
        Ok(encode_frame(TCP_FUNCTION_HEARTBEAT, &datalog, &[0x00]))
    }

    /// Read exactly one frame off the stream.
    pub async fn read_frame<S: AsyncRead + Unpin>(stream: &mut S) -> std::io::Result<Frame> {
        let mut header = [0u8; 6];
        stream.read_exact(&mut header).await?;
        if header[0..2] != PREFIX {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("bad frame prefix {:02X}{:02X}", header[0], header[1]),
            ));
        }
        let protocol = LittleEndian::read_u16(&header[2..4]);
        let length = LittleEndian::read_u16(&header[4..6]) as usize;
        if length < 14 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("frame too short: {length} bytes"),
            ));
        }

        let mut rest = vec![0u8; length];
        stream.read_exact(&mut rest).await?;

        let tcp_function = rest[1];
        let datalog = String::from_utf8_lossy(&rest[2..12]).into_owned();
        let data_len = LittleEndian::read_u16(&rest[12..14]) as usize;
        if rest.len() < 14 + data_len {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("data length {data_len} exceeds frame"),
            ));
        }
        let data = rest[14..14 + data_len].to_vec();

        let mut raw = Vec::with_capacity(6 + length);
        raw.extend_from_slice(&header);
        raw.extend_from_slice(&rest);

        Ok(Frame {
            protocol,
            tcp_function,
            datalog,
            data,
            raw,
        })
    }

    /// Parse a translated-data payload, verifying the trailing CRC.
    pub fn parse_translated(data: &[u8]) -> Result<TranslatedMessage> {
        if data.len() < BODY_HEADER_LEN + 2 {
            return Err(Error::read_transient(
                "dongle frame",
                format!("translated payload too short: {} bytes", data.len()),
            ));
        }
        let (body, crc_bytes) = data.split_at(data.len() - 2);
        let expected = LittleEndian::read_u16(crc_bytes);
        let actual = crc16(body);
        if expected != actual {
            return Err(Error::read_transient(
                "dongle frame",
                format!("checksum mismatch: expected {expected:#06X}, computed {actual:#06X}"),
            ));
        }

        let is_reply = body[0] != 0;
        let device_function = DeviceFunction::from_byte(body[1]).ok_or_else(|| {
            Error::read_rejected("dongle frame", format!("unknown device function {:#04X}", body[1]))
        })?;
        let inverter = String::from_utf8_lossy(&body[2..12]).into_owned();
        let register = LittleEndian::read_u16(&body[12..14]);
        let tail = &body[14..];

        let payload = match (device_function, is_reply) {
            (DeviceFunction::ReadHold | DeviceFunction::ReadInput, false) => {
                if tail.len() != 2 {
                    return Err(Error::read_transient("dongle frame", "malformed read request"));
                }
                TranslatedPayload::ReadRequest {
                    count: LittleEndian::read_u16(tail),
                }
            }
            (DeviceFunction::ReadHold | DeviceFunction::ReadInput, true) => {
                let value_len = *tail.first().ok_or_else(|| {
                    Error::read_transient("dongle frame", "read reply missing length")
                })? as usize;
                let values = tail.get(1..1 + value_len).ok_or_else(|| {
                    Error::read_transient("dongle frame", "read reply shorter than its length byte")
                })?;
                if value_len % 2 != 0 {
                    return Err(Error::read_transient("dongle frame", "odd read reply length"));
                }
                TranslatedPayload::Values(
                    values.chunks_exact(2).map(LittleEndian::read_u16).collect(),
                )
            }
            (DeviceFunction::WriteSingle, _) => {
                if tail.len() != 2 {
                    return Err(Error::read_transient("dongle frame", "malformed write-single"));
                }
                TranslatedPayload::SingleValue(LittleEndian::read_u16(tail))
            }
            (DeviceFunction::WriteMulti, false) => {
                if tail.len() < 3 {
                    return Err(Error::read_transient("dongle frame", "malformed write-multi"));
                }
                let count = LittleEndian::read_u16(&tail[0..2]) as usize;
                let byte_count = tail[2] as usize;
                let values = tail.get(3..3 + byte_count).ok_or_else(|| {
                    Error::read_transient("dongle frame", "write-multi payload truncated")
                })?;
                if byte_count != count * 2 {
                    return Err(Error::read_transient("dongle frame", "write-multi length mismatch"));
                }
                TranslatedPayload::WriteValues(
                    values.chunks_exact(2).map(LittleEndian::read_u16).collect(),
                )
            }
            (DeviceFunction::WriteMulti, true) => {
                if tail.len() != 2 {
                    return Err(Error::read_transient("dongle frame", "malformed write ack"));
                }
                TranslatedPayload::WriteAck {
                    count: LittleEndian::read_u16(tail),
                }
            }
        };

        Ok(TranslatedMessage {
            is_reply,
            device_function,
            inverter,
            register,
            payload,
        })
    }

}

struct DongleState {
    stream: Option<TcpStream>,
    consecutive_errors: u32,
    last_read_retried: bool,
}

/// Dongle transport addressed by `(host, dongle_serial, inverter_serial)`.
pub struct DongleTransport {
    host: String,
    port: u16,
    dongle_serial: String,
    inverter_serial: String,
    timeout: Duration,
    retries: u32,
    retry_delay: Duration,
    inter_register_delay: Duration,
    max_consecutive_errors: u32,
    family_override: SyncRwLock<Option<InverterFamily>>,
    state: Mutex<DongleState>,
    identity: RwLock<Option<DeviceIdentity>>,
    connected: AtomicBool,
    serial_mismatch: AtomicBool,
}

impl DongleTransport {
    /// Create a disconnected dongle transport. Both serials are the 10-char
    /// identifiers printed on the hardware labels.
    pub fn new(
        host: impl Into<String>,
        dongle_serial: impl Into<String>,
        inverter_serial: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            dongle_serial: dongle_serial.into(),
            inverter_serial: inverter_serial.into(),
            timeout: super::modbus::DEFAULT_TIMEOUT,
            retries: super::modbus::DEFAULT_RETRIES,
            retry_delay: super::modbus::DEFAULT_RETRY_DELAY,
            inter_register_delay: super::modbus::DEFAULT_INTER_REGISTER_DELAY,
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
            family_override: SyncRwLock::new(None),
            state: Mutex::new(DongleState {
                stream: None,
                consecutive_errors: 0,
                last_read_retried: false,
            }),
            identity: RwLock::new(None),
            connected: AtomicBool::new(false),
            serial_mismatch: AtomicBool::new(false),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_family(self, family: InverterFamily) -> Self {
        *self
            .family_override
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(family);
        self
    }

    pub fn set_family(&self, family: Option<InverterFamily>) {
        *self
            .family_override
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = family;
    }

    pub async fn identity(&self) -> Option<DeviceIdentity> {
        self.identity.read().await.clone()
    }

    pub fn serial_mismatch(&self) -> bool {
        self.serial_mismatch.load(Ordering::Relaxed)
    }

    async fn open_stream(&self) -> Result<TcpStream> {
        let target = format!("{}:{}", self.host, self.port);
        let stream = timeout(self.timeout, TcpStream::connect(&target))
            .await
            .map_err(|_| Error::timeout(format!("connect to {target}")))?
            .map_err(|err| Error::connection_with(format!("dongle refused at {target}"), err))?;
        stream
            .set_nodelay(true)
            .map_err(|err| Error::connection_with("failed to configure socket", err))?;
        Ok(stream)
    }

    /// One request/reply exchange under the state lock. Heartbeat frames
    /// arriving in between are acknowledged by echoing them back.
    async fn exchange(
        &self,
        request: Vec<u8>,
        expect: DeviceFunction,
        operation: &str,
    ) -> Result<TranslatedMessage> {
        let mut state = self.state.lock().await;
        let stream = match state.stream.as_mut() {
            Some(stream) => stream,
            None => return Err(Error::connection("transport not connected")),
        };

        let outcome: Result<TranslatedMessage> = async {
            timeout(self.timeout, stream.write_all(&request))
                .await
                .map_err(|_| Error::timeout(operation.to_string()))?
                .map_err(|err| Error::read_transient_with(operation, "send failed", err))?;

            let mut skipped = 0u32;
            loop {
                let received = timeout(self.timeout, frame::read_frame(stream))
                    .await
                    .map_err(|_| Error::timeout(operation.to_string()))?
                    .map_err(|err| {
                        Error::read_transient_with(operation, err.to_string(), err)
                    })?;

                if received.tcp_function == frame::TCP_FUNCTION_HEARTBEAT {
                    debug!(datalog = %received.datalog, "acknowledging dongle heartbeat");
                    timeout(self.timeout, stream.write_all(&received.raw))
                        .await
                        .map_err(|_| Error::timeout(operation.to_string()))?
                        .map_err(|err| {
                            Error::read_transient_with(operation, "heartbeat ack failed", err)
                        })?;
                    continue;
                }

                if received.tcp_function != frame::TCP_FUNCTION_TRANSLATED {
                    skipped += 1;
                    if skipped > MAX_SKIPPED_FRAMES {
                        return Err(Error::read_transient(operation, "no reply among frames"));
                    }
                    continue;
                }

                let message = frame::parse_translated(&received.data)?;
                if !message.is_reply || message.device_function != expect {
                    debug!(function = ?message.device_function, "skipping non-matching frame");
                    skipped += 1;
                    if skipped > MAX_SKIPPED_FRAMES {
                        return Err(Error::read_transient(operation, "no reply among frames"));
                    }
                    continue;
                }
                return Ok(message);
            }
        }
        .await;

        match &outcome {
            Ok(_) => state.consecutive_errors = 0,
            Err(_) => state.consecutive_errors += 1,
        }
        outcome
    }

    async fn read_registers(&self, address: u16, count: u16, input: bool) -> Result<Vec<u16>> {
        let function = if input {
            DeviceFunction::ReadInput
        } else {
            DeviceFunction::ReadHold
        };
        let reg_type = if input { "input" } else { "holding" };
        let operation = format!("read {reg_type} registers at {address}");
        let count = count.min(MAX_REGISTERS_PER_READ);
        let request = frame::encode_read(
            &self.dongle_serial,
            &self.inverter_serial,
            function,
            address,
            count,
        )?;

        self.state.lock().await.last_read_retried = false;

        let mut last_err: Option<Error> = None;
        for attempt in 0..=self.retries {
            match self.exchange(request.clone(), function, &operation).await {
                Ok(message) => match message.payload {
                    TranslatedPayload::Values(values) => {
                        if values.len() != count as usize {
                            return Err(Error::read_rejected(
                                operation,
                                format!("short read: wanted {count} registers, got {}", values.len()),
                            ));
                        }
                        return Ok(values);
                    }
                    other => {
                        return Err(Error::read_rejected(
                            operation,
                            format!("unexpected reply payload {other:?}"),
                        ));
                    }
                },
                Err(err) if err.is_transient() && attempt < self.retries => {
                    let delay = self.retry_delay * 2u32.saturating_pow(attempt);
                    debug!(
                        attempt = attempt + 1,
                        retries = self.retries,
                        reg_type,
                        address,
                        delay_ms = delay.as_millis() as u64,
                        "retrying dongle read"
                    );
                    self.state.lock().await.last_read_retried = true;
                    sleep(delay).await;
                    last_err = Some(err);
                }
                Err(err) if err.is_transient() => last_err = Some(err),
                Err(err) => {
                    error!(reg_type, address, error = %err, "dongle read rejected");
                    return Err(err);
                }
            }
        }

        let err = last_err
            .unwrap_or_else(|| Error::read_transient(operation.clone(), "retries exhausted"));
        error!(reg_type, address, attempts = self.retries + 1, error = %err, "dongle read failed");
        Err(err)
    }

    /// Write one run of holding registers. Never retried; the echo/ack is
    /// verified against what was sent.
    async fn write_holding(&self, address: u16, values: &[u16]) -> Result<()> {
        let operation = format!("write holding registers at {address}");
        if values.len() == 1 {
            let request = frame::encode_write_single(
                &self.dongle_serial,
                &self.inverter_serial,
                address,
                values[0],
            )?;
            let reply = self
                .exchange(request, DeviceFunction::WriteSingle, &operation)
                .await
                .map_err(write_classified)?;
            match reply.payload {
                TranslatedPayload::SingleValue(echo) if echo == values[0] => Ok(()),
                TranslatedPayload::SingleValue(echo) => Err(Error::write(
                    operation,
                    format!("echo mismatch: wrote {}, device echoed {echo}", values[0]),
                )),
                other => Err(Error::write(operation, format!("unexpected ack {other:?}"))),
            }
        } else {
            let request = frame::encode_write_multi(
                &self.dongle_serial,
                &self.inverter_serial,
                address,
                values,
            )?;
            let reply = self
                .exchange(request, DeviceFunction::WriteMulti, &operation)
                .await
                .map_err(write_classified)?;
            match reply.payload {
                TranslatedPayload::WriteAck { count } if count as usize == values.len() => Ok(()),
                TranslatedPayload::WriteAck { count } => Err(Error::write(
                    operation,
                    format!("short write: sent {} registers, device wrote {count}", values.len()),
                )),
                other => Err(Error::write(operation, format!("unexpected ack {other:?}"))),
            }
        }
    }

    async fn read_window(&self, start: u16, count: u16, input: bool) -> Result<RawRegisters> {
        let mut regs = RawRegisters::new();
        let mut address = start;
        let mut remaining = count;
        while remaining > 0 {
            let chunk = remaining.min(MAX_REGISTERS_PER_READ);
            let words = self.read_registers(address, chunk, input).await?;
            regs.absorb_block(address, &words);
            address = address.wrapping_add(chunk);
            remaining -= chunk;
        }
        Ok(regs)
    }

    async fn read_register_groups(&self, names: Option<&[&str]>) -> Result<RawRegisters> {
        self.reconnect_if_degraded().await?;

        let groups: Vec<_> = match names {
            Some(names) => INPUT_REGISTER_GROUPS
                .iter()
                .filter(|g| names.contains(&g.name))
                .collect(),
            None => INPUT_REGISTER_GROUPS.iter().collect(),
        };

        let mut regs = RawRegisters::new();
        let mut delay = self.inter_register_delay;
        for (i, group) in groups.iter().enumerate() {
            let words = self
                .read_registers(group.start, group.count, true)
                .await
                .map_err(|err| {
                    error!(group = group.name, error = %err, "failed to read register group");
                    err
                })?;
            regs.absorb_block(group.start, &words);

            if self.state.lock().await.last_read_retried {
                delay = (delay * 2).min(MAX_INTER_GROUP_DELAY);
                debug!(delay_ms = delay.as_millis() as u64, "increasing inter-group delay after retries");
            }
            if i + 1 < groups.len() {
                sleep(delay).await;
            }
        }
        Ok(regs)
    }

    async fn reconnect_if_degraded(&self) -> Result<()> {
        if self.state.lock().await.consecutive_errors < self.max_consecutive_errors {
            return Ok(());
        }
        let mut state = self.state.lock().await;
        if state.consecutive_errors < self.max_consecutive_errors {
            return Ok(());
        }
        warn!(
            host = %self.host,
            errors = state.consecutive_errors,
            "reconnecting dongle after consecutive errors"
        );
        state.stream = None;
        let stream = self.open_stream().await?;
        state.stream = Some(stream);
        state.consecutive_errors = 0;
        Ok(())
    }

    fn resolved_family(&self) -> Option<InverterFamily> {
        *self
            .family_override
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn require_family(&self) -> Result<InverterFamily> {
        if let Some(family) = self.resolved_family() {
            return Ok(family);
        }
        match self.identity.read().await.as_ref() {
            Some(identity) => identity.family.ok_or_else(|| {
                Error::device(format!(
                    "unrecognised device type code {}; set a family override to proceed",
                    identity.device_type_code
                ))
            }),
            None => Err(Error::device(
                "device family unknown; connect() must discover identity first",
            )),
        }
    }

    async fn require_inverter_family(&self) -> Result<InverterFamily> {
        let family = self.require_family().await?;
        if family.is_grid_interface() {
            return Err(Error::device(
                "device is a GridBOSS/MID; use read_midbox_runtime",
            ));
        }
        Ok(family)
    }

    pub async fn read_serial_number(&self) -> Result<String> {
        discovery::read_serial_number(self).await
    }

    pub async fn read_firmware_version(&self) -> Result<String> {
        discovery::read_firmware_version(self).await
    }

    pub async fn read_device_type(&self) -> Result<u16> {
        discovery::read_device_type(self).await
    }

    /// Raw parallel-configuration word from input register 113.
    pub async fn read_parallel_config(&self) -> Result<u16> {
        let words = self
            .read_registers(crate::registers::INPUT_PARALLEL_CONFIG_ADDRESS, 1, true)
            .await?;
        Ok(words.first().copied().unwrap_or(0))
    }
}

fn write_classified(err: Error) -> Error {
    // Exchange failures during a write surface as write errors, except
    // timeouts which keep their class.
    match err {
        Error::Timeout { .. } | Error::Write { .. } | Error::Connection { .. } => err,
        other => Error::write("write holding registers", other.to_string()),
    }
}

#[async_trait]
impl RegisterIo for DongleTransport {
    async fn read_input_registers(&self, address: u16, count: u16) -> Result<Vec<u16>> {
        self.read_registers(address, count, true).await
    }

    async fn read_holding_registers(&self, address: u16, count: u16) -> Result<Vec<u16>> {
        self.read_registers(address, count, false).await
    }
}

#[async_trait]
impl Transport for DongleTransport {
    fn capabilities(&self) -> TransportCapabilities {
        TransportCapabilities {
            can_read_runtime: true,
            can_read_energy: true,
            can_read_battery: true,
            is_local: true,
            requires_authentication: false,
        }
    }

    fn serial(&self) -> &str {
        &self.inverter_serial
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    async fn connect(&self) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            if state.stream.is_some() {
                return Ok(());
            }
            let stream = self.open_stream().await?;
            state.stream = Some(stream);
            state.consecutive_errors = 0;
        }
        self.connected.store(true, Ordering::Relaxed);

        match discovery::discover_device_info(self).await {
            Ok(identity) => {
                if !identity.serial.is_empty() && identity.serial != self.inverter_serial {
                    warn!(
                        expected = %self.inverter_serial,
                        actual = %identity.serial,
                        "inverter behind the dongle does not match the expected serial"
                    );
                    self.serial_mismatch.store(true, Ordering::Relaxed);
                }
                *self.identity.write().await = Some(identity);
            }
            Err(err) => {
                warn!(error = %err, "identity discovery failed");
            }
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.stream = None;
        state.consecutive_errors = 0;
        self.connected.store(false, Ordering::Relaxed);
        *self.identity.write().await = None;
        Ok(())
    }

    async fn read_runtime(&self) -> Result<InverterRuntimeData> {
        let family = self.require_inverter_family().await?;
        let regs = self.read_register_groups(None).await?;
        Ok(InverterRuntimeData::from_registers(&regs, family.runtime_map()))
    }

    async fn read_energy(&self) -> Result<InverterEnergyData> {
        let family = self.require_inverter_family().await?;
        let mut regs = self.read_register_groups(Some(&ENERGY_PRIMARY_GROUPS)).await?;

        match self
            .read_register_groups(Some(&[ENERGY_SUPPLEMENTARY_GROUP]))
            .await
        {
            Ok(bms) => regs.merge(bms),
            Err(err) if err.is_transient() || matches!(err, Error::Read { .. }) => {
                debug!(error = %err, "bms_data registers unavailable, continuing without them");
            }
            Err(err) => return Err(err),
        }

        Ok(InverterEnergyData::from_registers(&regs, family.energy_map()))
    }

    async fn read_battery(&self, include_individual: bool) -> Result<Option<BatteryBankData>> {
        let family = self.require_inverter_family().await?;
        let map = family.runtime_map();
        self.reconnect_if_degraded().await?;

        let regs = self.read_window(0, 128, true).await?;

        let bank_voltage = map.battery_voltage.value(&regs);
        if bank_voltage.map_or(true, |v| v <= NO_BATTERY_VOLTAGE_THRESHOLD) {
            debug!(?bank_voltage, "no battery present, skipping module registers");
            return Ok(None);
        }

        let battery_count =
            map.battery_count.raw(&regs).unwrap_or(0).clamp(0, i64::from(u16::MAX)) as u16;
        let mut individual = None;
        if include_individual && battery_count > 0 {
            let modules_to_read = battery_count.min(BATTERY_MODULE_MAX_COUNT);
            let total_words = modules_to_read * BATTERY_MODULE_WORDS;
            match self
                .read_window(BATTERY_MODULE_BASE_ADDRESS, total_words, true)
                .await
            {
                Ok(extended) => individual = Some(extended),
                Err(err) => {
                    warn!(error = %err, "failed to read individual battery registers");
                }
            }
        }

        Ok(BatteryBankData::from_registers(&regs, map, individual.as_ref()))
    }

    async fn read_midbox_runtime(&self) -> Result<MidboxRuntimeData> {
        let family = self.require_family().await?;
        if !family.is_grid_interface() {
            return Err(Error::device(
                "device is not a GridBOSS/MID; use read_runtime",
            ));
        }
        self.reconnect_if_degraded().await?;

        let mut regs = RawRegisters::new();
        for (i, group) in MIDBOX_REGISTER_GROUPS.iter().enumerate() {
            let words = self.read_registers(group.start, group.count, true).await?;
            regs.absorb_block(group.start, &words);
            if i + 1 < MIDBOX_REGISTER_GROUPS.len() {
                sleep(self.inter_register_delay).await;
            }
        }
        Ok(MidboxRuntimeData::from_registers(&regs, &gridboss::RUNTIME_MAP))
    }

    async fn read_parameters(&self, start: u16, count: u16) -> Result<ParameterValues> {
        if count == 0 {
            return Err(Error::config("parameter count must be positive"));
        }
        let regs = self.read_window(start, count, false).await?;
        let mut map = BTreeMap::new();
        for offset in 0..count {
            let address = start.wrapping_add(offset);
            if let Some(value) = regs.get(address) {
                map.insert(address, value);
            }
        }
        Ok(ParameterValues::ByAddress(map))
    }

    async fn write_parameters(&self, updates: ParameterUpdates) -> Result<()> {
        let registers = match updates {
            ParameterUpdates::Registers(map) => map,
            ParameterUpdates::Named(_) => {
                return Err(Error::config(
                    "named parameters require the cloud transport; local writes use register addresses",
                ));
            }
        };
        if registers.is_empty() {
            return Ok(());
        }
        for (start, values) in coalesce_writes(&registers) {
            self.write_holding(start, &values).await?;
        }
        Ok(())
    }
}
