//! Full message paths through a [`Bridge`] wired to a recording host.

use std::sync::Arc;

use alarm_bridge::config::keys;
use alarm_bridge::host::{Capability, CapabilityValue, HostCall};
use alarm_bridge::panel::{SecurityMode, SecuritySystemState};
use alarm_bridge::persistence::SettingChange;
use alarm_bridge::{Bridge, MemoryStore, RecordingHost};
use pretty_assertions::assert_eq;

const DOOR: &str = r#"[{"id":"door","name":"Front Door","kind":"contact","topics":{"contact":"zones/door","lowBattery":"zones/door/lowbat","tamper":"zones/door/tamper"}}]"#;

fn bridge(values: &[(&str, &str)]) -> (Bridge, Arc<RecordingHost>) {
    let host = Arc::new(RecordingHost::new());
    let store = MemoryStore::with_values(values.iter().copied());
    (Bridge::new(Box::new(store), host.clone()), host)
}

fn security(mode: SecurityMode, triggered: Option<bool>) -> CapabilityValue {
    CapabilityValue::Security(SecuritySystemState {
        mode,
        triggered,
        ..SecuritySystemState::default()
    })
}

fn battery_levels(host: &RecordingHost, native_id: &str) -> Vec<CapabilityValue> {
    host.notifications(native_id, Capability::Battery)
}

#[test]
fn sensors_are_announced_before_any_notification() {
    let (_bridge, host) = bridge(&[(keys::SENSORS_JSON, DOOR)]);

    let calls = host.calls();
    assert_eq!(calls[0], HostCall::AnnounceBatch(vec!["sensor:door".to_string()]));
    assert!(calls[1..]
        .iter()
        .all(|call| matches!(call, HostCall::Notify { .. })));
}

#[test]
fn removed_sensor_is_dropped_once_and_goes_quiet() {
    let (mut bridge, host) = bridge(&[(keys::SENSORS_JSON, DOOR)]);
    assert_eq!(bridge.sensors().len(), 1);

    let change = bridge.apply_setting("sensor.door.remove", "true").unwrap();
    assert_eq!(change, SettingChange::Sensors);
    assert!(bridge.sensors().is_empty());

    bridge.reconcile();
    assert_eq!(host.removals(), vec!["sensor:door".to_string()]);

    host.clear();
    bridge.handle_message("zones/door", b"open");
    assert_eq!(host.calls(), Vec::new());
}

#[test]
fn current_state_report_updates_security_record() {
    let (mut bridge, host) = bridge(&[(keys::TOPIC_GET_CURRENT, "alarm/state")]);

    bridge.handle_message("alarm/state", b"arm_away");
    bridge.handle_message("alarm/state", b" ARM_AWAY ");

    assert_eq!(bridge.panel().security().mode, SecurityMode::AwayArmed);
    assert_eq!(bridge.panel().security().triggered, None);
    assert_eq!(
        host.notifications("panel", Capability::SecuritySystem),
        vec![security(SecurityMode::AwayArmed, None)]
    );
}

#[test]
fn triggered_follows_each_report() {
    let (mut bridge, host) = bridge(&[(keys::TOPIC_GET_CURRENT, "alarm/state")]);

    bridge.handle_message("alarm/state", b"triggered");
    bridge.handle_message("alarm/state", b"armed_away");
    bridge.handle_message("alarm/state", b"triggered");

    assert_eq!(
        host.notifications("panel", Capability::SecuritySystem),
        vec![
            security(SecurityMode::Disarmed, Some(true)),
            security(SecurityMode::AwayArmed, None),
            security(SecurityMode::AwayArmed, Some(true)),
        ]
    );
    assert!(bridge.panel().security().is_triggered());
}

#[test]
fn stay_is_home_only_in_loose_mode() {
    let (mut loose, _) = bridge(&[(keys::TOPIC_GET_CURRENT, "alarm/state")]);
    loose.handle_message("alarm/state", b"stay");
    assert_eq!(loose.panel().security().mode, SecurityMode::HomeArmed);

    let (mut strict, host) = bridge(&[
        (keys::TOPIC_GET_CURRENT, "alarm/state"),
        (keys::STRICT_STATES, "true"),
    ]);
    strict.handle_message("alarm/state", b"stay");
    assert_eq!(strict.panel().security().mode, SecurityMode::Disarmed);
    assert!(host
        .notifications("panel", Capability::SecuritySystem)
        .is_empty());

    strict.handle_message("alarm/state", b"armed_home");
    assert_eq!(strict.panel().security().mode, SecurityMode::HomeArmed);
}

#[test]
fn strict_commands_use_first_configured_token() {
    let (mut bridge, _) = bridge(&[
        (keys::TOPIC_SET_TARGET, "alarm/set"),
        (keys::TOPIC_GET_CURRENT, "alarm/state"),
        (keys::STRICT_STATES, "true"),
        (keys::STRICT_AWAY, r#"["AWAY_ARMED", "away"]"#),
    ]);
    let message = bridge.prepare_command(SecurityMode::AwayArmed).unwrap();
    assert_eq!(message.payload, "AWAY_ARMED");

    let message = bridge.prepare_command(SecurityMode::Disarmed).unwrap();
    assert_eq!(message.payload, "disarmed");

    bridge.handle_message("alarm/state", b"away_armed");
    assert_eq!(bridge.panel().security().mode, SecurityMode::AwayArmed);
}

#[test]
fn battery_level_is_clamped_and_unit_tolerant() {
    let sensors = r#"[{"id":"pir","name":"Hall","kind":"motion","topics":{"motion":"zones/pir","batteryLevel":"zones/pir/battery"}}]"#;
    let (mut bridge, host) = bridge(&[(keys::SENSORS_JSON, sensors)]);

    bridge.handle_message("zones/pir/battery", b"90");
    bridge.handle_message("zones/pir/battery", b"150");
    bridge.handle_message("zones/pir/battery", b"n/a");
    bridge.handle_message("zones/pir/battery", b"42%");

    assert_eq!(
        battery_levels(&host, "sensor:pir"),
        vec![
            CapabilityValue::Level(100.0),
            CapabilityValue::Level(90.0),
            CapabilityValue::Level(100.0),
            CapabilityValue::Level(42.0),
        ]
    );
}

#[test]
fn low_battery_flag_toggles_level() {
    let (mut bridge, host) = bridge(&[(keys::SENSORS_JSON, DOOR)]);

    bridge.handle_message("zones/door/lowbat", b"false");
    bridge.handle_message("zones/door/lowbat", b"true");
    bridge.handle_message("zones/door/lowbat", b"false");

    assert_eq!(
        battery_levels(&host, "sensor:door"),
        vec![
            CapabilityValue::Level(100.0),
            CapabilityValue::Level(10.0),
            CapabilityValue::Level(100.0),
        ]
    );
    assert_eq!(
        bridge.sensors().get("sensor:door").and_then(|s| s.battery_level()),
        Some(100.0)
    );
}

#[test]
fn one_publish_reaches_every_matching_sensor() {
    let sensors = r#"[
        {"id":"a","name":"A","kind":"motion","topics":{"motion":"zones/+/motion"}},
        {"id":"b","name":"B","kind":"motion","topics":{"motion":"zones/#"}}
    ]"#;
    let (mut bridge, host) = bridge(&[(keys::SENSORS_JSON, sensors)]);

    bridge.handle_message("zones/hall/motion", br#"{"motion": true}"#);

    assert_eq!(
        host.notifications("sensor:a", Capability::MotionSensor),
        vec![CapabilityValue::Flag(true)]
    );
    assert_eq!(
        host.notifications("sensor:b", Capability::MotionSensor),
        vec![CapabilityValue::Flag(true)]
    );
}

#[test]
fn settings_edits_reshape_sensors() {
    let (mut bridge, host) = bridge(&[]);

    assert_eq!(
        bridge.apply_setting(keys::NEW_ID, "garage").unwrap(),
        SettingChange::Ignored
    );
    bridge.apply_setting(keys::NEW_KIND, "occupancy").unwrap();
    assert_eq!(
        bridge.apply_setting(keys::NEW_CREATE, "true").unwrap(),
        SettingChange::Sensors
    );
    assert_eq!(
        bridge.apply_setting("sensor.garage.topic.occupancy", "garage/presence").unwrap(),
        SettingChange::Sensors
    );
    assert!(bridge
        .subscriptions()
        .contains(&"garage/presence".to_string()));

    bridge.handle_message("garage/presence", b"occupied");
    let garage = bridge.sensors().get("sensor:garage").unwrap();
    assert_eq!(garage.config().name, "garage");
    assert_eq!(garage.occupied(), Some(true));
    assert_eq!(
        host.notifications("sensor:garage", Capability::OccupancySensor),
        vec![CapabilityValue::Flag(true)]
    );

    assert_eq!(
        bridge.apply_setting(keys::BROKER_URL, "mqtt://broker:1884").unwrap(),
        SettingChange::Connection
    );
    assert_eq!(bridge.settings().broker.url, "mqtt://broker:1884");
}
