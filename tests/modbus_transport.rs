//! End-to-end Modbus transport tests against an in-process mock server.

mod common;

use std::collections::BTreeMap;
use std::time::Duration;

use common::{ascii_words, MockModbusServer};
use lxp_client::transport::discovery::DEVICE_TYPE_CODE_GRIDBOSS;
use lxp_client::transport::discovery::DEVICE_TYPE_CODE_PV_SERIES;
use lxp_client::{
    Error, InverterFamily, ModbusTransport, ParameterUpdates, ParameterValues, Transport,
};

const SERIAL: &str = "CE12345678";
const FIRMWARE: &str = "FAAB2525";

async fn connected_transport(server: &MockModbusServer) -> ModbusTransport {
    common::init_tracing();
    let transport = ModbusTransport::new(server.host(), SERIAL)
        .with_port(server.port())
        .with_timeout(Duration::from_millis(500));
    transport.connect().await.expect("connect");
    transport
}

#[tokio::test]
async fn test_connect_discovers_identity() {
    let server = MockModbusServer::start().await;
    server.seed_identity(DEVICE_TYPE_CODE_PV_SERIES, SERIAL, FIRMWARE).await;

    let transport = connected_transport(&server).await;
    assert!(transport.is_connected());

    let identity = transport.identity().await.expect("identity discovered");
    assert_eq!(identity.serial, SERIAL);
    assert_eq!(identity.device_type_code, DEVICE_TYPE_CODE_PV_SERIES);
    assert_eq!(identity.family, Some(InverterFamily::PvSeries));
    assert_eq!(identity.firmware_version, FIRMWARE);
    assert!(!transport.serial_mismatch());

    transport.disconnect().await.unwrap();
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn test_serial_mismatch_flagged_but_connected() {
    common::init_tracing();
    let server = MockModbusServer::start().await;
    server.seed_identity(DEVICE_TYPE_CODE_PV_SERIES, "ZZ99999999", FIRMWARE).await;

    let transport = ModbusTransport::new(server.host(), SERIAL)
        .with_port(server.port())
        .with_timeout(Duration::from_millis(500));
    transport.connect().await.expect("connect succeeds despite mismatch");
    assert!(transport.is_connected());
    assert!(transport.serial_mismatch());
}

#[tokio::test]
async fn test_read_runtime_round_trip() {
    let server = MockModbusServer::start().await;
    server.seed_identity(DEVICE_TYPE_CODE_PV_SERIES, SERIAL, FIRMWARE).await;
    server.set_input_registers(1, &[5100]).await;
    server.set_input_registers(4, &[530, 0x6455]).await;
    server.set_input_registers(7, &[1000, 1500]).await;
    server.set_input_registers(12, &[2410]).await;
    server.set_input_registers(15, &[5998, 2300]).await;
    server.set_input_registers(27, &[1500]).await;

    let transport = connected_transport(&server).await;
    server.clear_requests().await;

    let runtime = transport.read_runtime().await.expect("read_runtime");
    assert_eq!(runtime.pv1_voltage, Some(510.0));
    assert_eq!(runtime.battery_voltage, Some(53.0));
    assert_eq!(runtime.battery_soc, Some(85));
    assert_eq!(runtime.battery_soh, Some(100));
    assert_eq!(runtime.pv1_power, Some(1000));
    assert_eq!(runtime.pv2_power, Some(1500));
    assert_eq!(runtime.grid_voltage_r, Some(241.0));
    assert_eq!(runtime.grid_frequency, Some(59.98));
    assert_eq!(runtime.inverter_power, Some(2300));
    assert_eq!(runtime.load_power, Some(1500));

    // One FC4 request per declared group, in declared order.
    let requests = server.requests().await;
    let reads: Vec<_> = requests.iter().filter(|r| r.function == 0x04).collect();
    assert_eq!(reads.len(), 6);
    assert_eq!(
        reads.iter().map(|r| (r.address, r.count)).collect::<Vec<_>>(),
        vec![(0, 32), (32, 32), (64, 16), (80, 33), (113, 18), (170, 2)]
    );
}

#[tokio::test]
async fn test_read_runtime_idempotent_under_stable_registers() {
    let server = MockModbusServer::start().await;
    server.seed_identity(DEVICE_TYPE_CODE_PV_SERIES, SERIAL, FIRMWARE).await;
    server.set_input_registers(1, &[5100]).await;
    server.set_input_registers(4, &[530, 0x6455]).await;

    let transport = connected_transport(&server).await;
    let first = transport.read_runtime().await.unwrap();
    let second = transport.read_runtime().await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_read_energy_survives_missing_bms_group() {
    let server = MockModbusServer::start().await;
    server.seed_identity(DEVICE_TYPE_CODE_PV_SERIES, SERIAL, FIRMWARE).await;
    server.set_input_registers(28, &[125, 87]).await;
    server.set_input_registers(33, &[40, 62]).await;
    // Make the bms_data group fail with an exception response.
    server.mark_illegal(80).await;

    let transport = connected_transport(&server).await;
    let energy = transport.read_energy().await.expect("energy read succeeds");
    assert_eq!(energy.pv1_energy_today, Some(12.5));
    assert_eq!(energy.charge_energy_today, Some(4.0));
    assert_eq!(energy.discharge_energy_today, Some(6.2));
}

#[tokio::test]
async fn test_read_parameters_chunked() {
    let server = MockModbusServer::start().await;
    server.seed_identity(DEVICE_TYPE_CODE_PV_SERIES, SERIAL, FIRMWARE).await;
    let values: Vec<u16> = (0..80).collect();
    server.set_holding_registers(0, &values).await;

    let transport = connected_transport(&server).await;
    server.clear_requests().await;

    let params = transport.read_parameters(0, 80).await.expect("read_parameters");
    let map = match params {
        ParameterValues::ByAddress(map) => map,
        other => panic!("expected address map, got {other:?}"),
    };
    assert_eq!(map.len(), 80);
    assert_eq!(map[&0], 0);
    assert_eq!(map[&39], 39);
    assert_eq!(map[&40], 40);
    assert_eq!(map[&79], 79);

    // 80 registers arrive as two 40-register FC3 reads.
    let reads: Vec<_> = server
        .requests()
        .await
        .into_iter()
        .filter(|r| r.function == 0x03)
        .collect();
    assert_eq!(reads.len(), 2);
    assert_eq!(reads[0].address, 0);
    assert_eq!(reads[0].count, 40);
    assert_eq!(reads[1].address, 40);
    assert_eq!(reads[1].count, 40);
}

#[tokio::test]
async fn test_write_parameters_coalesces_consecutive_addresses() {
    let server = MockModbusServer::start().await;
    server.seed_identity(DEVICE_TYPE_CODE_PV_SERIES, SERIAL, FIRMWARE).await;

    let transport = connected_transport(&server).await;
    server.clear_requests().await;

    let updates = BTreeMap::from([(10, 1), (11, 2), (12, 3), (20, 9)]);
    transport
        .write_parameters(ParameterUpdates::Registers(updates))
        .await
        .expect("write_parameters");

    let writes: Vec<_> = server
        .requests()
        .await
        .into_iter()
        .filter(|r| r.function == 0x10 || r.function == 0x06)
        .collect();
    assert_eq!(writes.len(), 2, "one multi-write plus one single write");
    assert_eq!(writes[0].function, 0x10);
    assert_eq!(writes[0].address, 10);
    assert_eq!(writes[0].count, 3);
    assert_eq!(writes[1].function, 0x06);
    assert_eq!(writes[1].address, 20);

    assert_eq!(server.get_holding_register(10).await, Some(1));
    assert_eq!(server.get_holding_register(11).await, Some(2));
    assert_eq!(server.get_holding_register(12).await, Some(3));
    assert_eq!(server.get_holding_register(20).await, Some(9));
}

#[tokio::test]
async fn test_single_contiguous_block_is_one_frame() {
    let server = MockModbusServer::start().await;
    server.seed_identity(DEVICE_TYPE_CODE_PV_SERIES, SERIAL, FIRMWARE).await;

    let transport = connected_transport(&server).await;
    server.clear_requests().await;

    let updates: BTreeMap<u16, u16> = (100..140).map(|addr| (addr, addr * 2)).collect();
    transport
        .write_parameters(ParameterUpdates::Registers(updates))
        .await
        .unwrap();

    let writes: Vec<_> = server
        .requests()
        .await
        .into_iter()
        .filter(|r| r.function == 0x10)
        .collect();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].address, 100);
    assert_eq!(writes[0].count, 40);
}

#[tokio::test]
async fn test_battery_absent_skips_module_registers() {
    let server = MockModbusServer::start().await;
    server.seed_identity(DEVICE_TYPE_CODE_PV_SERIES, SERIAL, FIRMWARE).await;
    // Bank voltage register reads 0: no battery attached.
    server.set_input_registers(4, &[0]).await;
    server.set_input_registers(96, &[2]).await;

    let transport = connected_transport(&server).await;
    server.clear_requests().await;

    let bank = transport.read_battery(true).await.expect("read_battery");
    assert!(bank.is_none());

    // No request may touch the 5000+ module range.
    assert!(server
        .requests()
        .await
        .iter()
        .all(|request| request.address < 5000));
}

#[tokio::test]
async fn test_battery_with_individual_modules() {
    let server = MockModbusServer::start().await;
    server.seed_identity(DEVICE_TYPE_CODE_PV_SERIES, SERIAL, FIRMWARE).await;
    server.set_input_registers(4, &[530, 0x6455]).await;
    server.set_input_registers(96, &[2, 280]).await; // count, capacity
    server.set_input_registers(98, &[0xFF9C]).await; // -10.0 A

    // Two module blocks at 5000 and 5030.
    for (block, soc_soh) in [(5000u16, 0x6257u16), (5030u16, 0x6455u16)] {
        server.set_input_registers(block, &[0xC003, 140]).await;
        server.set_input_registers(block + 6, &[5312, 0xFFCE, soc_soh]).await;
        server.set_input_registers(block + 17, &ascii_words("BT2400001234CD", 7)).await;
    }

    let transport = connected_transport(&server).await;
    let bank = transport
        .read_battery(true)
        .await
        .expect("read_battery")
        .expect("battery present");

    assert_eq!(bank.voltage, Some(53.0));
    assert_eq!(bank.soc, Some(85));
    assert_eq!(bank.current, Some(-10.0));
    assert_eq!(bank.battery_count, Some(2));
    assert_eq!(bank.modules.len(), 2);
    assert_eq!(bank.modules[0].soc, Some(0x57));
    assert_eq!(bank.modules[0].voltage, Some(53.12));
    assert_eq!(bank.modules[0].serial.as_deref(), Some("BT2400001234CD"));
    assert_eq!(bank.modules[1].index, 1);
}

#[tokio::test]
async fn test_transient_failure_retried_then_succeeds() {
    let server = MockModbusServer::start().await;
    server.seed_identity(DEVICE_TYPE_CODE_PV_SERIES, SERIAL, FIRMWARE).await;
    server.set_holding_registers(66, &[50]).await;

    let transport = connected_transport(&server).await;
    // Swallow exactly one request: the first attempt times out, the retry
    // lands.
    server.skip_next_responses(1);
    server.clear_requests().await;

    let params = transport.read_parameters(66, 1).await.expect("retry succeeds");
    match params {
        ParameterValues::ByAddress(map) => assert_eq!(map[&66], 50),
        other => panic!("unexpected {other:?}"),
    }
    assert!(server.requests().await.len() >= 2, "first attempt plus retry");
}

#[tokio::test]
async fn test_midbox_requires_gridboss_family() {
    let server = MockModbusServer::start().await;
    server.seed_identity(DEVICE_TYPE_CODE_PV_SERIES, SERIAL, FIRMWARE).await;

    let transport = connected_transport(&server).await;
    let err = transport.read_midbox_runtime().await.unwrap_err();
    assert!(matches!(err, Error::Device(_)));
}

#[tokio::test]
async fn test_gridboss_midbox_runtime() {
    common::init_tracing();
    let server = MockModbusServer::start().await;
    server.seed_identity(DEVICE_TYPE_CODE_GRIDBOSS, "GB12345678", FIRMWARE).await;
    server.set_input_registers(1, &[1203, 1198]).await; // grid L1/L2 volts
    server.set_input_registers(21, &[450, 620]).await; // UPS leg powers
    server.set_input_registers(129, &[6001]).await; // grid frequency

    let transport = ModbusTransport::new(server.host(), "GB12345678")
        .with_port(server.port())
        .with_timeout(Duration::from_millis(500));
    transport.connect().await.unwrap();

    // Inverter-style runtime reads are rejected for grid-interface devices.
    assert!(matches!(
        transport.read_runtime().await.unwrap_err(),
        Error::Device(_)
    ));

    server.clear_requests().await;
    let midbox = transport.read_midbox_runtime().await.expect("midbox runtime");
    assert_eq!(midbox.grid_l1_voltage, Some(120.3));
    assert_eq!(midbox.grid_l2_voltage, Some(119.8));
    assert_eq!(midbox.ups_power(), Some(1070));
    assert_eq!(midbox.grid_frequency, Some(60.01));

    let reads: Vec<_> = server
        .requests()
        .await
        .into_iter()
        .filter(|r| r.function == 0x04)
        .map(|r| (r.address, r.count))
        .collect();
    assert_eq!(reads, vec![(0, 40), (40, 28), (68, 40), (108, 12), (128, 4)]);
}

#[tokio::test]
async fn test_unknown_device_type_rejects_reads_until_override() {
    let server = MockModbusServer::start().await;
    server.seed_identity(9999, SERIAL, FIRMWARE).await;

    let transport = connected_transport(&server).await;
    let err = transport.read_runtime().await.unwrap_err();
    assert!(matches!(err, Error::Device(_)));

    // An explicit family override unlocks decoding.
    transport.set_family(Some(InverterFamily::PvSeries));
    server.set_input_registers(4, &[530, 0x6455]).await;
    let runtime = transport.read_runtime().await.expect("override enables reads");
    assert_eq!(runtime.battery_voltage, Some(53.0));
}
