//! Device identity discovery for local transports.
//!
//! Executed once per connected transport: read the device-type code from its
//! holding register, map it to a register-map family, then read the serial
//! and firmware windows. An unrecognised code leaves the transport connected
//! but family-dependent reads reject until the caller overrides the family.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::data;
use crate::error::Result;
use crate::registers::{
    InverterFamily, RawRegisters, HOLD_DEVICE_TYPE_ADDRESS, HOLD_FIRMWARE_ADDRESS,
    HOLD_FIRMWARE_WORDS, HOLD_SERIAL_ADDRESS, HOLD_SERIAL_WORDS,
};
use crate::transport::DeviceIdentity;

// Device-type codes reported at holding register 19. The PV_SERIES code is
// verified on 18kPV hardware; the others follow vendor firmware tables.
pub const DEVICE_TYPE_CODE_PV_SERIES: u16 = 2092;
pub const DEVICE_TYPE_CODE_FLEXBOSS: u16 = 2156;
pub const DEVICE_TYPE_CODE_SNA: u16 = 2376;
pub const DEVICE_TYPE_CODE_GRIDBOSS: u16 = 2595;
pub const DEVICE_TYPE_CODE_LXP_EU: u16 = 44;

/// Map a device-type code to its register-map family.
pub fn family_for_code(code: u16) -> Option<InverterFamily> {
    match code {
        DEVICE_TYPE_CODE_PV_SERIES => Some(InverterFamily::PvSeries),
        DEVICE_TYPE_CODE_FLEXBOSS => Some(InverterFamily::Flexboss),
        DEVICE_TYPE_CODE_SNA => Some(InverterFamily::Sna),
        DEVICE_TYPE_CODE_GRIDBOSS => Some(InverterFamily::GridBossMid),
        DEVICE_TYPE_CODE_LXP_EU => Some(InverterFamily::LxpEu),
        _ => None,
    }
}

/// Whether a device-type code identifies a GridBOSS/MID grid-interface
/// device rather than an inverter.
pub fn is_midbox_code(code: u16) -> bool {
    code == DEVICE_TYPE_CODE_GRIDBOSS
}

/// Raw register access implemented by both local transports; the seam the
/// discovery probe (and the scanner's verification pass) runs over.
#[async_trait]
pub trait RegisterIo: Send + Sync {
    /// Read input registers (FC4 semantics), at most 40 per call.
    async fn read_input_registers(&self, address: u16, count: u16) -> Result<Vec<u16>>;

    /// Read holding registers (FC3 semantics), at most 40 per call.
    async fn read_holding_registers(&self, address: u16, count: u16) -> Result<Vec<u16>>;
}

/// Read the device-type code from holding register 19.
pub async fn read_device_type(io: &dyn RegisterIo) -> Result<u16> {
    let words = io
        .read_holding_registers(HOLD_DEVICE_TYPE_ADDRESS, 1)
        .await?;
    Ok(words.first().copied().unwrap_or(0))
}

/// Read the 10-character device serial from its five-word holding window.
pub async fn read_serial_number(io: &dyn RegisterIo) -> Result<String> {
    let words = io
        .read_holding_registers(HOLD_SERIAL_ADDRESS, HOLD_SERIAL_WORDS)
        .await?;
    let mut regs = RawRegisters::new();
    regs.absorb_block(HOLD_SERIAL_ADDRESS, &words);
    Ok(data::decode_ascii(&regs, HOLD_SERIAL_ADDRESS, HOLD_SERIAL_WORDS).unwrap_or_default())
}

/// Read the firmware code (e.g. "FAAB-2525") from its four-word holding
/// window; empty string when the window reads blank.
pub async fn read_firmware_version(io: &dyn RegisterIo) -> Result<String> {
    let words = io
        .read_holding_registers(HOLD_FIRMWARE_ADDRESS, HOLD_FIRMWARE_WORDS)
        .await?;
    let mut regs = RawRegisters::new();
    regs.absorb_block(HOLD_FIRMWARE_ADDRESS, &words);
    Ok(data::decode_ascii(&regs, HOLD_FIRMWARE_ADDRESS, HOLD_FIRMWARE_WORDS).unwrap_or_default())
}

/// Run the full identity probe.
pub async fn discover_device_info(io: &dyn RegisterIo) -> Result<DeviceIdentity> {
    let device_type_code = read_device_type(io).await?;
    let family = family_for_code(device_type_code);
    if family.is_none() {
        warn!(device_type_code, "unrecognised device type code");
    }

    let serial = read_serial_number(io).await?;
    let firmware_version = read_firmware_version(io).await?;

    let family_label = family.map(|f| f.to_string()).unwrap_or_else(|| "unknown".into());
    debug!(
        serial = %serial,
        device_type_code,
        family = %family_label,
        firmware = %firmware_version,
        "discovered device identity"
    );

    Ok(DeviceIdentity {
        serial,
        device_type_code,
        firmware_version,
        family,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    struct FakeIo {
        holding: Mutex<HashMap<u16, u16>>,
    }

    impl FakeIo {
        fn new(pairs: &[(u16, u16)]) -> Self {
            Self {
                holding: Mutex::new(pairs.iter().copied().collect()),
            }
        }
    }

    #[async_trait]
    impl RegisterIo for FakeIo {
        async fn read_input_registers(&self, _address: u16, _count: u16) -> Result<Vec<u16>> {
            Ok(Vec::new())
        }

        async fn read_holding_registers(&self, address: u16, count: u16) -> Result<Vec<u16>> {
            let holding = self.holding.lock().await;
            Ok((0..count)
                .map(|offset| holding.get(&(address + offset)).copied().unwrap_or(0))
                .collect())
        }
    }

    fn ascii_words(start: u16, text: &[u8]) -> Vec<(u16, u16)> {
        text.chunks(2)
            .enumerate()
            .map(|(i, pair)| {
                let low = u16::from(pair[0]);
                let high = pair.get(1).map(|&b| u16::from(b)).unwrap_or(0);
                (start + i as u16, low | (high << 8))
            })
            .collect()
    }

    #[tokio::test]
    async fn test_family_for_code() {
        assert_eq!(
            family_for_code(DEVICE_TYPE_CODE_PV_SERIES),
            Some(InverterFamily::PvSeries)
        );
        assert_eq!(
            family_for_code(DEVICE_TYPE_CODE_FLEXBOSS),
            Some(InverterFamily::Flexboss)
        );
        assert_eq!(
            family_for_code(DEVICE_TYPE_CODE_GRIDBOSS),
            Some(InverterFamily::GridBossMid)
        );
        assert_eq!(family_for_code(9999), None);
        assert!(is_midbox_code(DEVICE_TYPE_CODE_GRIDBOSS));
        assert!(!is_midbox_code(DEVICE_TYPE_CODE_PV_SERIES));
    }

    #[tokio::test]
    async fn test_discover_known_device() {
        let mut pairs = vec![(HOLD_DEVICE_TYPE_ADDRESS, DEVICE_TYPE_CODE_PV_SERIES)];
        pairs.extend(ascii_words(HOLD_SERIAL_ADDRESS, b"CE12345678"));
        pairs.extend(ascii_words(HOLD_FIRMWARE_ADDRESS, b"FAAB2525"));
        let io = FakeIo::new(&pairs);

        let identity = discover_device_info(&io).await.unwrap();
        assert_eq!(identity.serial, "CE12345678");
        assert_eq!(identity.device_type_code, DEVICE_TYPE_CODE_PV_SERIES);
        assert_eq!(identity.family, Some(InverterFamily::PvSeries));
        assert_eq!(identity.firmware_version, "FAAB2525");
    }

    #[tokio::test]
    async fn test_discover_unknown_code_keeps_identity() {
        let mut pairs = vec![(HOLD_DEVICE_TYPE_ADDRESS, 9999)];
        pairs.extend(ascii_words(HOLD_SERIAL_ADDRESS, b"ZZ00000001"));
        let io = FakeIo::new(&pairs);

        let identity = discover_device_info(&io).await.unwrap();
        assert_eq!(identity.device_type_code, 9999);
        assert_eq!(identity.family, None);
        assert_eq!(identity.serial, "ZZ00000001");
        assert_eq!(identity.firmware_version, "");
    }
}
