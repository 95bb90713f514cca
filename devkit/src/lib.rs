/*!
# Zonewatch DevKit - Test doubles for the zone monitoring kernel

Lets tests drive the kernel without a broker or real time:
- `ManualClock` for deterministic liveness and dedup windows
- `MockMqttClient` recording everything the kernel publishes
- `SensorMessageBuilder` for reading payloads in both wire formats
- `MonitorHarness` wiring all of the above around a `ZoneMonitor`
*/

pub mod clock;
pub mod mqtt_stub;
pub mod test_utils;

pub use clock::ManualClock;
pub use mqtt_stub::{MockMqttClient, SensorMessageBuilder};
pub use test_utils::MonitorHarness;
