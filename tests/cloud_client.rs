//! Cloud client tests against a wiremock API server: session lifecycle,
//! silent re-login, response caching and error backoff.

mod common;

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lxp_client::{
    create_http_transport, Error, LuxpowerClient, ParameterUpdates, ParameterValues, Transport,
};

const SERIAL: &str = "1234567890";

fn login_body() -> serde_json::Value {
    json!({
        "success": true,
        "username": "testuser",
        "userId": 99999,
        "plants": [{"plantId": 99999, "name": "My Solar Station"}]
    })
}

fn runtime_body() -> serde_json::Value {
    json!({
        "success": true,
        "serialNum": SERIAL,
        "soc": 71,
        "vpv1": 5100,
        "vBat": 530,
        "fac": 5998,
        "ppv1": 1000,
        "ppv2": 1500,
        "pinv": 2300,
        "pToUser": 1030,
        "serverTime": "2024-01-15 10:30:00"
    })
}

async fn mock_login(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/WManage/web/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(login_body()))
        .expect(expected_calls)
        .mount(server)
        .await;
}

fn client_for(server: &MockServer) -> LuxpowerClient {
    common::init_tracing();
    LuxpowerClient::with_base_url("testuser", "testpass", server.uri()).unwrap()
}

#[tokio::test]
async fn test_login_success_sets_session() {
    let server = MockServer::start().await;
    mock_login(&server, 1).await;

    let client = client_for(&server);
    let response = client.login().await.expect("login");
    assert!(response.success);
    assert_eq!(response.username.as_deref(), Some("testuser"));
    assert_eq!(response.user_id, Some(99999));
    assert_eq!(response.plants.len(), 1);
    assert_eq!(client.consecutive_errors(), 0);
}

#[tokio::test]
async fn test_login_failure_is_auth_error_and_backs_off() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/WManage/web/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": false, "msg": "invalid account or password"})),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert_eq!(client.current_backoff_delay(), 0.0);

    let err = client.login().await.unwrap_err();
    assert!(matches!(err, Error::Auth(_)));
    assert_eq!(client.consecutive_errors(), 1);
    assert!(client.current_backoff_delay() > 0.0);
}

#[tokio::test]
async fn test_runtime_read_is_cached() {
    let server = MockServer::start().await;
    mock_login(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/WManage/api/inverter/getInverterRuntime"))
        .respond_with(ResponseTemplate::new(200).set_body_json(runtime_body()))
        .expect(1) // the second call must come from the cache
        .mount(&server)
        .await;

    let client = client_for(&server);
    let first = client.devices().get_inverter_runtime(SERIAL).await.unwrap();
    let second = client.devices().get_inverter_runtime(SERIAL).await.unwrap();
    assert_eq!(first.soc, second.soc);
    assert_eq!(first.server_time, second.server_time);
}

#[tokio::test]
async fn test_silent_relogin_on_session_loss() {
    let server = MockServer::start().await;
    // Initial login plus exactly one re-login.
    mock_login(&server, 2).await;

    // First runtime call: session rejected. Second: data.
    Mock::given(method("POST"))
        .and(path("/WManage/api/inverter/getInverterRuntime"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": false, "msg": "please login first"})),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/WManage/api/inverter/getInverterRuntime"))
        .respond_with(ResponseTemplate::new(200).set_body_json(runtime_body()))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let runtime = client
        .devices()
        .get_inverter_runtime(SERIAL)
        .await
        .expect("request replayed after re-login");
    assert_eq!(runtime.soc, Some(71));
}

#[tokio::test]
async fn test_second_auth_failure_surfaces() {
    let server = MockServer::start().await;
    mock_login(&server, 2).await;
    Mock::given(method("POST"))
        .and(path("/WManage/api/inverter/getInverterRuntime"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": false, "msg": "please login first"})),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.devices().get_inverter_runtime(SERIAL).await.unwrap_err();
    assert!(matches!(err, Error::Auth(_)));
}

#[tokio::test]
async fn test_http_401_triggers_relogin() {
    let server = MockServer::start().await;
    mock_login(&server, 2).await;
    Mock::given(method("POST"))
        .and(path("/WManage/api/inverter/getInverterRuntime"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/WManage/api/inverter/getInverterRuntime"))
        .respond_with(ResponseTemplate::new(200).set_body_json(runtime_body()))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let runtime = client.devices().get_inverter_runtime(SERIAL).await.unwrap();
    assert_eq!(runtime.soc, Some(71));
}

#[tokio::test]
async fn test_parameter_read_returns_named_values() {
    let server = MockServer::start().await;
    mock_login(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/WManage/web/maintain/remoteRead/read"))
        .and(body_string_contains("inverterSn=1234567890"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "inverterSn": SERIAL,
            "startRegister": 0,
            "pointNumber": 127,
            "HOLD_SYSTEM_CHARGE_SOC_LIMIT": 100,
            "HOLD_AC_CHARGE_POWER_CMD": 50,
            "FUNC_AC_CHARGE": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let params = client.control().read_parameters(SERIAL, 0, 127).await.unwrap();
    assert_eq!(params.get("HOLD_SYSTEM_CHARGE_SOC_LIMIT"), Some(&json!(100)));
    assert_eq!(params.get("HOLD_AC_CHARGE_POWER_CMD"), Some(&json!(50)));
    assert_eq!(params.get("FUNC_AC_CHARGE"), Some(&json!(true)));
}

#[tokio::test]
async fn test_parameter_write_form_fields() {
    let server = MockServer::start().await;
    mock_login(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/WManage/web/maintain/remoteSet/write"))
        .and(body_string_contains("holdParam=HOLD_SYSTEM_CHARGE_SOC_LIMIT"))
        .and(body_string_contains("valueText=90"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let response = client
        .control()
        .write_parameter(SERIAL, "HOLD_SYSTEM_CHARGE_SOC_LIMIT", "90")
        .await
        .unwrap();
    assert!(response.success);
}

#[tokio::test]
async fn test_rejected_write_is_write_error() {
    let server = MockServer::start().await;
    mock_login(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/WManage/web/maintain/remoteSet/write"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": false, "msg": "value out of range"})),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .control()
        .write_parameter(SERIAL, "HOLD_SYSTEM_CHARGE_SOC_LIMIT", "250")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Write { .. }));
}

#[tokio::test]
async fn test_http_transport_end_to_end() {
    let server = MockServer::start().await;
    mock_login(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/WManage/api/inverter/getInverterRuntime"))
        .respond_with(ResponseTemplate::new(200).set_body_json(runtime_body()))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/WManage/api/battery/getBatteryInfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "serialNum": SERIAL,
            "soc": 71,
            "vBat": 530,
            "batParallelNum": 1,
            "batteryArray": [
                {"batterySn": "BT24000012CD56", "batIndex": 0, "totalVoltage": 5312,
                 "current": -50, "soc": 70, "soh": 99}
            ]
        })))
        .mount(&server)
        .await;

    let client = Arc::new(client_for(&server));
    let transport = create_http_transport(Arc::clone(&client), SERIAL);
    assert!(transport.capabilities().requires_authentication);

    transport.connect().await.expect("connect logs in");
    let runtime = transport.read_runtime().await.unwrap();
    assert_eq!(runtime.pv1_voltage, Some(510.0));
    assert_eq!(runtime.battery_soc, Some(71));
    assert_eq!(runtime.grid_frequency, Some(59.98));
    assert_eq!(runtime.load_power, Some(1030));

    let bank = transport.read_battery(true).await.unwrap().expect("battery present");
    assert_eq!(bank.voltage, Some(53.0));
    assert_eq!(bank.modules.len(), 1);
    assert_eq!(bank.modules[0].current, Some(-5.0));

    // Register-style writes belong to the local transports.
    let err = transport
        .write_parameters(ParameterUpdates::Registers(Default::default()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));

    // Named read path yields names, not addresses.
    Mock::given(method("POST"))
        .and(path("/WManage/web/maintain/remoteRead/read"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "inverterSn": SERIAL,
            "HOLD_AC_CHARGE_SOC_LIMIT": 100
        })))
        .mount(&server)
        .await;
    let params = transport.read_parameters(0, 16).await.unwrap();
    assert!(matches!(params, ParameterValues::ByName(map) if map.contains_key("HOLD_AC_CHARGE_SOC_LIMIT")));

    transport.disconnect().await.unwrap();
    assert!(!transport.is_connected());
}
