//! [`Hub`] – owns the three stores and drives them from one event loop.
//!
//! Everything that touches a store runs on the single task inside
//! [`Hub::run`]: the telemetry tick, producer events from any thread (sent
//! through a [`HubHandle`]) and parameter acks. Each event runs to completion,
//! listeners included, before the next is taken, so the stores need no
//! locking.
//!
//! # Example
//!
//! ```rust,no_run
//! use ugv_hub::{Hub, HubConfig, HubHandle};
//!
//! #[tokio::main]
//! async fn main() {
//!     let (handle, events) = HubHandle::channel();
//!     let hub = Hub::with_simulated_link(HubConfig::default(), &handle);
//!     let task = tokio::spawn(hub.run(events));
//!
//!     handle.emergency_stop().unwrap();
//!     handle.shutdown().unwrap();
//!     task.await.unwrap();
//! }
//! ```

use std::ops::ControlFlow;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use ugv_types::{
    CommandUpdate, ConfigAck, DeviceId, HubError, ParamPath, ParameterTree, TelemetryUpdate,
    TelemetryValue, Topic,
};

use crate::control::ControlArbiter;
use crate::input::{AxisSample, DEFAULT_DEADZONE, GamepadMapper, KeyboardStop};
use crate::link_monitor::LinkMonitor;
use crate::mock::{DEFAULT_PATH_CAPACITY, MockTelemetry};
use crate::parameters::ParameterSynchronizer;
use crate::registry::SubscriptionId;
use crate::telemetry::TelemetryDistributor;
use crate::transport::{CommandBridge, ConfigTransport, SimulatedConfigLink};

/// Tuning for the hub and its simulated collaborators.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Sensor tick period; 20 ms is 50 Hz.
    pub telemetry_period: Duration,
    /// Drive the telemetry topics from [`MockTelemetry`].
    pub mock_telemetry: bool,
    pub path_capacity: usize,
    pub grid_size: usize,
    pub ack_delay_min: Duration,
    pub ack_delay_max: Duration,
    /// Silence after which the link is reported `Disconnected`.
    pub link_timeout: Duration,
    pub deadzone: f32,
    /// m/s at full deflection.
    pub max_linear_mps: f32,
    /// rad/s at full deflection.
    pub max_angular_rps: f32,
    pub parameters: ParameterTree,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            telemetry_period: Duration::from_millis(20),
            mock_telemetry: true,
            path_capacity: DEFAULT_PATH_CAPACITY,
            grid_size: ugv_types::telemetry::DEFAULT_GRID_SIZE,
            ack_delay_min: Duration::from_millis(200),
            ack_delay_max: Duration::from_millis(800),
            link_timeout: Duration::from_millis(1000),
            deadzone: DEFAULT_DEADZONE,
            max_linear_mps: 2.0,
            max_angular_rps: 2.0,
            parameters: ParameterTree::default(),
        }
    }
}

/// Everything producers and the config link can ask of the hub.
#[derive(Debug, Clone)]
pub enum HubEvent {
    Telemetry(TelemetryUpdate),
    Command(CommandUpdate),
    Gamepad(AxisSample),
    DeviceConnected(DeviceId),
    DeviceDisconnected(DeviceId),
    EmergencyStop,
    ClearEmergencyStop,
    ToggleEmergencyStop,
    WriteParam { path: ParamPath, value: f64 },
    Ack(ConfigAck),
    Shutdown,
}

/// Cloneable sender side of the hub's event loop.
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: UnboundedSender<HubEvent>,
}

impl HubHandle {
    /// Create a handle and the receiver to pass to [`Hub::run`].
    pub fn channel() -> (Self, UnboundedReceiver<HubEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, event: HubEvent) -> Result<(), HubError> {
        self.tx
            .send(event)
            .map_err(|e| HubError::Channel(format!("hub stopped: {e}")))
    }

    pub fn publish_telemetry(&self, update: TelemetryUpdate) -> Result<(), HubError> {
        self.send(HubEvent::Telemetry(update))
    }

    pub fn command(&self, update: CommandUpdate) -> Result<(), HubError> {
        self.send(HubEvent::Command(update))
    }

    pub fn emergency_stop(&self) -> Result<(), HubError> {
        self.send(HubEvent::EmergencyStop)
    }

    pub fn clear_emergency_stop(&self) -> Result<(), HubError> {
        self.send(HubEvent::ClearEmergencyStop)
    }

    pub fn write_param(&self, path: ParamPath, value: f64) -> Result<(), HubError> {
        self.send(HubEvent::WriteParam { path, value })
    }

    pub fn shutdown(&self) -> Result<(), HubError> {
        self.send(HubEvent::Shutdown)
    }

    pub(crate) fn sender(&self) -> UnboundedSender<HubEvent> {
        self.tx.clone()
    }
}

/// The three stores plus the producers that feed them.
pub struct Hub {
    config: HubConfig,
    telemetry: TelemetryDistributor,
    control: ControlArbiter,
    parameters: ParameterSynchronizer,
    gamepad: GamepadMapper,
    keyboard: KeyboardStop,
    mock: Option<MockTelemetry>,
    link: LinkMonitor,
}

impl Hub {
    /// Build the stores. Parameter writes leave through `transport`.
    pub fn new(config: HubConfig, transport: Box<dyn ConfigTransport>) -> Self {
        let mock = config
            .mock_telemetry
            .then(|| MockTelemetry::new(config.path_capacity, config.grid_size));
        Self {
            telemetry: TelemetryDistributor::new(),
            control: ControlArbiter::new(),
            parameters: ParameterSynchronizer::new(config.parameters.clone(), transport),
            gamepad: GamepadMapper::new(config.deadzone),
            keyboard: KeyboardStop,
            mock,
            link: LinkMonitor::new(config.link_timeout),
            config,
        }
    }

    /// A hub whose parameter writes are acknowledged by a
    /// [`SimulatedConfigLink`] feeding back into `handle`.
    pub fn with_simulated_link(config: HubConfig, handle: &HubHandle) -> Self {
        let link = SimulatedConfigLink::new(
            &handle.sender(),
            config.ack_delay_min,
            config.ack_delay_max,
        );
        Self::new(config, Box::new(link))
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn telemetry(&self) -> &TelemetryDistributor {
        &self.telemetry
    }

    pub fn telemetry_mut(&mut self) -> &mut TelemetryDistributor {
        &mut self.telemetry
    }

    pub fn control(&self) -> &ControlArbiter {
        &self.control
    }

    pub fn control_mut(&mut self) -> &mut ControlArbiter {
        &mut self.control
    }

    pub fn parameters(&self) -> &ParameterSynchronizer {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut ParameterSynchronizer {
        &mut self.parameters
    }

    /// Forward every committed command to `outbound` as `/cmd_vel` frames,
    /// scaled by the configured top speeds.
    pub fn attach_command_bridge(&mut self, outbound: UnboundedSender<String>) -> SubscriptionId {
        let mut bridge = CommandBridge::new(
            outbound,
            self.config.max_linear_mps,
            self.config.max_angular_rps,
        );
        self.control.subscribe(move |cmd| bridge.on_command(cmd))
    }

    /// Process events until [`HubEvent::Shutdown`] or until every
    /// [`HubHandle`] is dropped. Returns the disposed hub so final state can
    /// still be read.
    pub async fn run(mut self, mut events: UnboundedReceiver<HubEvent>) -> Self {
        let mut ticker = tokio::time::interval(self.config.telemetry_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            period_ms = self.config.telemetry_period.as_millis() as u64,
            mock = self.mock.is_some(),
            "hub running"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => self.on_tick(Instant::now()),
                event = events.recv() => match event {
                    Some(event) => {
                        if self.handle(event).is_break() {
                            break;
                        }
                    }
                    None => {
                        debug!("all hub handles dropped");
                        break;
                    }
                },
            }
        }

        self.dispose();
        self
    }

    /// Apply one event to the stores.
    pub fn handle(&mut self, event: HubEvent) -> ControlFlow<()> {
        match event {
            HubEvent::Telemetry(update) => self.ingest(update, Instant::now()),
            HubEvent::Command(update) => {
                let _ = self.control.update(update);
            }
            HubEvent::Gamepad(sample) => {
                if let Some(update) = self.gamepad.map(&sample) {
                    let _ = self.control.update(update);
                }
            }
            HubEvent::DeviceConnected(device) => {
                let _ = self.control.device_connected(device);
            }
            HubEvent::DeviceDisconnected(device) => {
                let _ = self.control.device_disconnected(&device);
            }
            HubEvent::EmergencyStop => self.control.trigger_emergency_stop(),
            HubEvent::ClearEmergencyStop => self.control.clear_emergency_stop(),
            HubEvent::ToggleEmergencyStop => {
                self.keyboard.toggle(&mut self.control);
            }
            HubEvent::WriteParam { path, value } => {
                if let Err(e) = self.parameters.request_write(path, value) {
                    warn!(error = %e, "parameter write refused");
                }
            }
            HubEvent::Ack(ack) => {
                self.parameters.confirm(ack);
            }
            HubEvent::Shutdown => {
                info!("hub shutdown requested");
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// One telemetry period: advance the mock feed and check link liveness.
    pub fn on_tick(&mut self, now: Instant) {
        if let Some(mock) = self.mock.as_mut() {
            let update = mock.tick();
            self.ingest(update, now);
        }
        if let Some(status) = self.link.check(now) {
            self.telemetry
                .update(TelemetryUpdate::new().status(status));
        }
    }

    /// Drop every subscription. The stores keep their last state.
    pub fn dispose(&mut self) {
        self.telemetry.dispose();
        self.control.dispose();
        self.parameters.dispose();
        info!("hub disposed");
    }

    fn ingest(&mut self, mut update: TelemetryUpdate, now: Instant) {
        if let Some(status) = self.link.observe(now)
            && !update.topics().any(|t| *t == Topic::Status)
        {
            update.set(Topic::Status, TelemetryValue::Status(status));
        }
        self.telemetry.update(update);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use ugv_types::{ConfigWrite, Imu, InputSource, LinkStatus, ParameterState};

    #[derive(Clone, Default)]
    struct CapturingTransport {
        sent: Arc<Mutex<Vec<ConfigWrite>>>,
    }

    impl ConfigTransport for CapturingTransport {
        fn forward(&mut self, write: ConfigWrite) {
            self.sent.lock().unwrap().push(write);
        }
    }

    fn quiet_config() -> HubConfig {
        HubConfig {
            mock_telemetry: false,
            ..HubConfig::default()
        }
    }

    fn hub() -> (Hub, CapturingTransport) {
        let transport = CapturingTransport::default();
        (Hub::new(quiet_config(), Box::new(transport.clone())), transport)
    }

    #[test]
    fn gamepad_event_reaches_arbiter() {
        let (mut hub, _) = hub();
        let _ = hub.handle(HubEvent::Gamepad(AxisSample::new(vec![0.0, -0.5, 0.0, 0.0])));
        let cmd = hub.control().snapshot();
        assert_eq!(cmd.linear, 0.5);
        assert_eq!(cmd.active_input, InputSource::Gamepad);
    }

    #[test]
    fn stop_blocks_commands_until_toggled_off() {
        let (mut hub, _) = hub();
        let _ = hub.handle(HubEvent::ToggleEmergencyStop);
        let _ = hub.handle(HubEvent::Command(CommandUpdate::default().linear(0.5)));
        assert_eq!(hub.control().snapshot().linear, 0.0);

        let _ = hub.handle(HubEvent::ToggleEmergencyStop);
        let _ = hub.handle(HubEvent::Command(CommandUpdate::default().linear(0.5)));
        assert_eq!(hub.control().snapshot().linear, 0.5);
    }

    #[test]
    fn parameter_write_and_ack_flow_through_events() {
        let (mut hub, transport) = hub();
        let path: ParamPath = "velocity.max_linear".parse().unwrap();
        let _ = hub.handle(HubEvent::WriteParam {
            path: path.clone(),
            value: 1.5,
        });
        assert!(hub.parameters().state().is_pending(&path));

        let ack = transport.sent.lock().unwrap()[0].ack();
        let _ = hub.handle(HubEvent::Ack(ack));
        let state = hub.parameters().state();
        assert_eq!(state.tree.get(&path), Some(1.5));
        assert!(!state.is_pending(&path));
    }

    #[test]
    fn shutdown_breaks_the_loop() {
        let (mut hub, _) = hub();
        assert!(hub.handle(HubEvent::Shutdown).is_break());
        assert!(hub.handle(HubEvent::EmergencyStop).is_continue());
    }

    #[test]
    fn first_telemetry_marks_link_connected() {
        let (mut hub, _) = hub();
        let _ = hub.handle(HubEvent::Telemetry(TelemetryUpdate::new().imu(Imu::default())));
        assert_eq!(
            hub.telemetry().get(&Topic::Status),
            Some(&TelemetryValue::Status(LinkStatus::Connected))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn silent_link_is_reported_disconnected() {
        let (mut hub, _) = hub();
        let start = Instant::now();
        let _ = hub.handle(HubEvent::Telemetry(TelemetryUpdate::new().latency(12.0)));

        hub.on_tick(start + Duration::from_millis(1500));
        assert_eq!(
            hub.telemetry().get(&Topic::Status),
            Some(&TelemetryValue::Status(LinkStatus::Disconnected))
        );
    }

    #[test]
    fn mock_tick_populates_topics() {
        let transport = CapturingTransport::default();
        let mut hub = Hub::new(HubConfig::default(), Box::new(transport));
        hub.on_tick(Instant::now());
        match hub.telemetry().get(&Topic::Path) {
            Some(TelemetryValue::Path(points)) => assert_eq!(points.len(), 1),
            other => panic!("unexpected path value {other:?}"),
        }
    }

    #[test]
    fn command_bridge_receives_scaled_twist() {
        let (mut hub, _) = hub();
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.attach_command_bridge(tx);
        // replay of the idle command
        let idle: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(idle["msg"]["linear"]["x"], 0.0);

        let _ = hub.handle(HubEvent::Command(CommandUpdate::drive(
            0.5,
            0.0,
            InputSource::Joystick,
        )));
        let frame: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(frame["msg"]["linear"]["x"], 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_confirms_writes_out_of_band() {
        let (handle, events) = HubHandle::channel();
        let mut hub = Hub::with_simulated_link(quiet_config(), &handle);
        let seen = Arc::new(Mutex::new(Vec::<ParameterState>::new()));
        let sink = Arc::clone(&seen);
        hub.parameters_mut().subscribe(move |state: &ParameterState| {
            sink.lock().unwrap().push(state.clone());
            Ok(())
        });

        let task = tokio::spawn(hub.run(events));
        let kp: ParamPath = "pid.kp".parse().unwrap();
        handle.write_param(kp.clone(), 2.0).unwrap();
        handle.write_param("pid.ki".parse().unwrap(), 0.1).unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
        handle.shutdown().unwrap();
        let hub = task.await.unwrap();

        let state = hub.parameters().state();
        assert_eq!(state.tree.get(&kp), Some(2.0));
        assert!(state.pending.is_empty());
        // replay, two pending notifications, two commits
        assert_eq!(seen.lock().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn run_loop_ends_when_handles_drop() {
        let (handle, events) = HubHandle::channel();
        let hub = Hub::new(quiet_config(), Box::new(CapturingTransport::default()));
        drop(handle);
        let hub = hub.run(events).await;
        assert!(!hub.control().is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn simulated_link_does_not_keep_the_loop_alive() {
        let (handle, events) = HubHandle::channel();
        let mut hub = Hub::with_simulated_link(quiet_config(), &handle);
        hub.parameters_mut()
            .request_write("pid.kd".parse().unwrap(), 0.7)
            .unwrap();
        drop(handle);

        let hub = tokio::time::timeout(Duration::from_secs(5), hub.run(events))
            .await
            .expect("run must return once every handle is gone");
        // the in-flight ack had nowhere to go
        assert_eq!(hub.parameters().pending_count(), 1);
    }
}
