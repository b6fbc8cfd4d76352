/// Inbound sensor data.
///
/// Submodules:
/// - `normalize`: validates one MQTT payload into a `SensorReading`.
/// - `mqtt`: broker subscription feeding raw messages into the pipeline.

pub mod mqtt;
pub mod normalize;
