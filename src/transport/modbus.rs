//! Modbus TCP transport.
//!
//! Direct register access to the inverter over the local network, without
//! cloud connectivity. One mutex serialises every frame exchange: the device
//! supports a single in-flight transaction per session, and concurrent
//! clients are known to desync transaction IDs. Run exactly ONE client
//! against each inverter at a time.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock as SyncRwLock;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{sleep, timeout};
use tokio_modbus::client::tcp;
use tokio_modbus::prelude::*;
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

pub const DEFAULT_PORT: u16 = 502;
pub const DEFAULT_UNIT_ID: u8 = 1;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RETRIES: u32 = 2;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_INTER_REGISTER_DELAY: Duration = Duration::from_millis(50);
const MAX_INTER_GROUP_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 3;

struct ModbusState {
    ctx: Option<tokio_modbus::client::Context>,
    consecutive_errors: u32,
    last_read_retried: bool,
}

/// Modbus TCP transport bound to `(host, port, unit_id)`.
///
/// Construct once and reuse: every instance owns a persistent TCP session,
/// and repeated instantiation exhausts ephemeral ports. Reconnection after
/// consecutive errors replaces the context in place.
pub struct ModbusTransport {
    host: String,
    port: u16,
    unit_id: u8,
    expected_serial: String,
    timeout: Duration,
    retries: u32,
    retry_delay: Duration,
    inter_register_delay: Duration,
    max_consecutive_errors: u32,
    family_override: SyncRwLock<Option<InverterFamily>>,
    state: Mutex<ModbusState>,
    identity: RwLock<Option<DeviceIdentity>>,
    connected: AtomicBool,
    serial_mismatch: AtomicBool,
}

impl ModbusTransport {
    /// Create a disconnected transport. `serial` is the serial the caller
    /// expects to find; pass an empty string to skip validation.
    pub fn new(host: impl Into<String>, serial: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            unit_id: DEFAULT_UNIT_ID,
            expected_serial: serial.into(),
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            inter_register_delay: DEFAULT_INTER_REGISTER_DELAY,
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
            family_override: SyncRwLock::new(None),
            state: Mutex::new(ModbusState {
                ctx: None,
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

    pub fn with_unit_id(mut self, unit_id: u8) -> Self {
        self.unit_id = unit_id;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_family(self, family: InverterFamily) -> Self {
        *self
            .family_override
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(family);
        self
    }

    /// Override the register-map family at runtime (e.g. after discovery
    /// reported an unknown device-type code).
    pub fn set_family(&self, family: Option<InverterFamily>) {
        *self
            .family_override
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = family;
    }

    /// Identity discovered at connect time, if the probe succeeded.
    pub async fn identity(&self) -> Option<DeviceIdentity> {
        self.identity.read().await.clone()
    }

    /// Whether the discovered serial differed from the caller-expected one.
    pub fn serial_mismatch(&self) -> bool {
        self.serial_mismatch.load(Ordering::Relaxed)
    }

    async fn open_context(&self) -> Result<tokio_modbus::client::Context> {
        let addr = self.resolve_addr().await?;
        let ctx = timeout(self.timeout, tcp::connect_slave(addr, Slave(self.unit_id)))
            .await
            .map_err(|_| Error::timeout(format!("connect to {addr}")))?
            .map_err(|err| {
                Error::connection_with(format!("failed to connect to {addr}"), err)
            })?;
        Ok(ctx)
    }

    async fn resolve_addr(&self) -> Result<SocketAddr> {
        let target = (self.host.as_str(), self.port);
        let mut addrs = tokio::net::lookup_host(target)
            .await
            .map_err(|err| Error::connection_with(format!("cannot resolve {}", self.host), err))?;
        addrs
            .next()
            .ok_or_else(|| Error::config(format!("host {} resolves to no address", self.host)))
    }

    fn classify_io_error(operation: &str, err: std::io::Error) -> Error {
        let message = err.to_string();
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                Error::timeout(operation)
            }
            std::io::ErrorKind::InvalidData => Error::read_rejected(operation, message),
            _ if message.contains("Exception")
                || message.contains("exception")
                || message.contains("Illegal") =>
            {
                // Modbus exception response: the device answered and said no.
                Error::read_rejected(operation, message)
            }
            _ => Error::read_transient_with(operation, message.clone(), err),
        }
    }

    /// Read a single register window (≤40 words) with retry and
    /// consecutive-error tracking.
    async fn read_registers(&self, address: u16, count: u16, input: bool) -> Result<Vec<u16>> {
        let reg_type = if input { "input" } else { "holding" };
        let operation = format!("read {reg_type} registers at {address}");
        let count = count.min(MAX_REGISTERS_PER_READ);

        self.state.lock().await.last_read_retried = false;

        let mut last_err: Option<Error> = None;
        for attempt in 0..=self.retries {
            let result = {
                let mut state = self.state.lock().await;
                let outcome = match state.ctx.as_mut() {
                    Some(ctx) => {
                        let request = async {
                            if input {
                                ctx.read_input_registers(address, count).await
                            } else {
                                ctx.read_holding_registers(address, count).await
                            }
                        };
                        timeout(self.timeout, request).await
                    }
                    None => return Err(Error::connection("transport not connected")),
                };
                match outcome {
                    Ok(Ok(words)) => {
                        state.consecutive_errors = 0;
                        Ok(words)
                    }
                    Ok(Err(err)) => {
                        state.consecutive_errors += 1;
                        Err(Self::classify_io_error(&operation, err))
                    }
                    Err(_) => {
                        state.consecutive_errors += 1;
                        Err(Error::timeout(operation.clone()))
                    }
                }
            };

            match result {
                Ok(words) => return Ok(words),
                Err(err) if err.is_transient() && attempt < self.retries => {
                    let delay = self.retry_delay * 2u32.saturating_pow(attempt);
                    debug!(
                        attempt = attempt + 1,
                        retries = self.retries,
                        reg_type,
                        address,
                        delay_ms = delay.as_millis() as u64,
                        "retrying register read"
                    );
                    self.state.lock().await.last_read_retried = true;
                    sleep(delay).await;
                    last_err = Some(err);
                }
                Err(err) if err.is_transient() => {
                    last_err = Some(err);
                }
                Err(err) => {
                    error!(reg_type, address, error = %err, "register read rejected");
                    return Err(err);
                }
            }
        }

        let err = last_err
            .unwrap_or_else(|| Error::read_transient(operation.clone(), "retries exhausted"));
        error!(
            reg_type,
            address,
            attempts = self.retries + 1,
            error = %err,
            "register read failed after retries"
        );
        Err(err)
    }

    /// Write one run of holding registers: FC6 for a single word, FC16 for a
    /// multi-word run. Never retried.
    async fn write_holding(&self, address: u16, values: &[u16]) -> Result<()> {
        let operation = format!("write holding registers at {address}");
        let mut state = self.state.lock().await;
        let outcome = match state.ctx.as_mut() {
            Some(ctx) => {
                let request = async {
                    if values.len() == 1 {
                        ctx.write_single_register(address, values[0]).await
                    } else {
                        ctx.write_multiple_registers(address, values).await
                    }
                };
                timeout(self.timeout, request).await
            }
            None => return Err(Error::connection("transport not connected")),
        };
        match outcome {
            Ok(Ok(())) => {
                state.consecutive_errors = 0;
                Ok(())
            }
            Ok(Err(err)) => {
                state.consecutive_errors += 1;
                error!(address, count = values.len(), error = %err, "register write failed");
                Err(Error::write_with(operation, err.to_string(), err))
            }
            Err(_) => {
                state.consecutive_errors += 1;
                error!(address, count = values.len(), "register write timed out");
                Err(Error::timeout(operation))
            }
        }
    }

    /// Read an arbitrarily sized window in ≤40-register chunks.
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

    /// Read input-register groups sequentially with adaptive inter-group
    /// pacing: the delay doubles (capped) for the rest of the batch once any
    /// read needed a retry, protecting RS-485-bridged devices from buffer
    /// overrun.
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

    /// Force a reconnect once too many consecutive errors accumulate. The
    /// state mutex guarantees a single reconnect at a time; the double check
    /// under the lock drops redundant attempts.
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
            "reconnecting after consecutive errors"
        );
        state.ctx = None;
        let ctx = self.open_context().await?;
        state.ctx = Some(ctx);
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

    /// Read the device serial from its holding window.
    pub async fn read_serial_number(&self) -> Result<String> {
        discovery::read_serial_number(self).await
    }

    /// Read the firmware code from its holding window.
    pub async fn read_firmware_version(&self) -> Result<String> {
        discovery::read_firmware_version(self).await
    }

    /// Read the device-type code from holding register 19.
    pub async fn read_device_type(&self) -> Result<u16> {
        discovery::read_device_type(self).await
    }

    /// Compare the device serial against an expected value, logging on
    /// mismatch.
    pub async fn validate_serial(&self, expected: &str) -> Result<bool> {
        let actual = self.read_serial_number().await?;
        let matches = actual == expected;
        if !matches {
            warn!(expected, actual, "serial mismatch");
        }
        Ok(matches)
    }

    /// Raw parallel-configuration word from input register 113.
    pub async fn read_parallel_config(&self) -> Result<u16> {
        let words = self
            .read_registers(crate::registers::INPUT_PARALLEL_CONFIG_ADDRESS, 1, true)
            .await?;
        Ok(words.first().copied().unwrap_or(0))
    }
}

#[async_trait]
impl RegisterIo for ModbusTransport {
    async fn read_input_registers(&self, address: u16, count: u16) -> Result<Vec<u16>> {
        self.read_registers(address, count, true).await
    }

    async fn read_holding_registers(&self, address: u16, count: u16) -> Result<Vec<u16>> {
        self.read_registers(address, count, false).await
    }
}

#[async_trait]
impl Transport for ModbusTransport {
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
        &self.expected_serial
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    async fn connect(&self) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            if state.ctx.is_some() {
                return Ok(());
            }
            let ctx = self.open_context().await?;
            state.ctx = Some(ctx);
            state.consecutive_errors = 0;
        }
        self.connected.store(true, Ordering::Relaxed);

        match discovery::discover_device_info(self).await {
            Ok(identity) => {
                if !self.expected_serial.is_empty()
                    && !identity.serial.is_empty()
                    && identity.serial != self.expected_serial
                {
                    warn!(
                        expected = %self.expected_serial,
                        actual = %identity.serial,
                        "connected device serial does not match the expected serial"
                    );
                    self.serial_mismatch.store(true, Ordering::Relaxed);
                }
                *self.identity.write().await = Some(identity);
            }
            Err(err) => {
                // Stay connected: callers can still read parameters or set a
                // family override manually.
                warn!(error = %err, "identity discovery failed");
            }
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.ctx = None;
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

        // BMS passthrough is supplementary; its loss must not fail the read.
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

        // Full runtime range: power/voltage block, battery current at 98,
        // BMS passthrough at 80-112.
        let regs = self.read_window(0, 128, true).await?;

        let bank_voltage = map.battery_voltage.value(&regs);
        if bank_voltage.map_or(true, |v| v <= NO_BATTERY_VOLTAGE_THRESHOLD) {
            debug!(?bank_voltage, "no battery present, skipping module registers");
            return Ok(None);
        }

        let battery_count = map.battery_count.raw(&regs).unwrap_or(0).clamp(0, i64::from(u16::MAX)) as u16;
        let mut individual = None;
        if include_individual && battery_count > 0 {
            let modules_to_read = battery_count.min(BATTERY_MODULE_MAX_COUNT);
            let total_words = modules_to_read * BATTERY_MODULE_WORDS;
            match self
                .read_window(BATTERY_MODULE_BASE_ADDRESS, total_words, true)
                .await
            {
                Ok(extended) => {
                    debug!(modules = modules_to_read, "read individual battery module registers");
                    individual = Some(extended);
                }
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
