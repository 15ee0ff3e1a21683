use crate::{
    config::{
        ComfortMode, ComfortProfile, ControlLoopConfig, ControlSettings, SettingsPreset, Staging,
    },
    guard::{DissipationKind, DissipationWindow, GuardId, ProtectionGuards},
    types::{
        ControlState, ControllerStatePayload, ControllerStatus, FanMode, OperatingMode,
        OutputState, RelayCommand,
    },
    validate::{SettingsError, ThresholdKey},
};

#[derive(Debug, Clone, Copy)]
struct HoldState {
    setpoint_f: f32,
    // None means the hold stands until explicitly released.
    expires_at_ms: Option<u64>,
}

/// Contactor control engine. Owns the working settings, the protection
/// guards and the machine state; every decision runs through `tick` with a
/// single caller-supplied monotonic instant, so the outcome is a pure
/// function of inputs plus stored timer stamps.
#[derive(Debug, Clone)]
pub struct RelayEngine {
    pub config: ControlLoopConfig,
    settings: ControlSettings,

    state: ControlState,
    outputs: OutputState,

    raw_temp_f: f32,
    last_sample_ms: Option<u64>,

    active_comfort: ComfortMode,
    hold: Option<HoldState>,

    guards: ProtectionGuards,
    dissipation: Option<DissipationWindow>,
}

impl RelayEngine {
    pub fn new(config: ControlLoopConfig, mut settings: ControlSettings) -> Self {
        settings.sanitize();
        Self {
            config,
            settings,
            state: ControlState::Idle,
            outputs: OutputState::OFF,
            raw_temp_f: 0.0,
            last_sample_ms: None,
            active_comfort: ComfortMode::Home,
            hold: None,
            guards: ProtectionGuards::default(),
            dissipation: None,
        }
    }

    pub fn settings(&self) -> &ControlSettings {
        &self.settings
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    pub fn outputs(&self) -> OutputState {
        self.outputs
    }

    pub fn raw_temp_f(&self) -> f32 {
        self.raw_temp_f
    }

    pub fn corrected_temp_f(&self) -> f32 {
        self.raw_temp_f + self.settings.thresholds.temperature_correction
    }

    pub fn active_comfort(&self) -> ComfortMode {
        self.active_comfort
    }

    pub fn update_reading(&mut self, temp_f: f32, now_ms: u64) {
        self.raw_temp_f = temp_f;
        self.last_sample_ms = Some(now_ms);
    }

    pub fn is_sensor_valid(&self, now_ms: u64) -> bool {
        self.last_sample_ms
            .map(|last| now_ms.saturating_sub(last) < self.config.sensor_stale_timeout_ms)
            .unwrap_or(false)
    }

    pub fn set_setpoint(&mut self, setpoint_f: f32) -> bool {
        if !setpoint_f.is_finite() {
            return false;
        }
        let clamped = setpoint_f.clamp(50.0, 90.0);
        // A setpoint edit during a hold re-targets the hold.
        if let Some(hold) = self.hold.as_mut() {
            hold.setpoint_f = clamped;
        }
        if (self.settings.setpoint_f - clamped).abs() > f32::EPSILON {
            self.settings.setpoint_f = clamped;
            true
        } else {
            false
        }
    }

    pub fn set_mode(&mut self, mode: OperatingMode) -> bool {
        if self.settings.mode != mode {
            self.settings.mode = mode;
            true
        } else {
            false
        }
    }

    pub fn set_threshold(&mut self, key: ThresholdKey, value: f64) -> Result<(), SettingsError> {
        self.settings.thresholds.set(key, value)
    }

    pub fn set_auto_heat_cool(&mut self, enabled: bool) -> bool {
        if self.settings.thresholds.auto_heat_cool != enabled {
            self.settings.thresholds.auto_heat_cool = enabled;
            true
        } else {
            false
        }
    }

    pub fn set_staging(&mut self, staging: Staging) -> bool {
        if self.settings.thresholds.staging != staging {
            self.settings.thresholds.staging = staging;
            true
        } else {
            false
        }
    }

    pub fn set_comfort_profile(
        &mut self,
        mode: ComfortMode,
        profile: ComfortProfile,
    ) -> Result<(), SettingsError> {
        self.settings.comfort.set(mode, profile)
    }

    pub fn apply_preset(&mut self, preset: SettingsPreset) -> Result<(), SettingsError> {
        self.settings.apply_preset(preset)
    }

    pub fn enter_hold(&mut self, duration_ms: Option<u64>, now_ms: u64) {
        self.hold = Some(HoldState {
            setpoint_f: self.settings.setpoint_f,
            expires_at_ms: duration_ms.map(|d| now_ms + d),
        });
    }

    pub fn exit_hold(&mut self) {
        self.hold = None;
    }

    pub fn hold_active(&self, now_ms: u64) -> bool {
        self.hold
            .map(|hold| hold.expires_at_ms.map_or(true, |end| now_ms < end))
            .unwrap_or(false)
    }

    pub fn hold_indefinite(&self) -> bool {
        matches!(
            self.hold,
            Some(HoldState {
                expires_at_ms: None,
                ..
            })
        )
    }

    pub fn hold_remaining_ms(&self, now_ms: u64) -> u64 {
        self.hold
            .and_then(|hold| hold.expires_at_ms)
            .map(|end| end.saturating_sub(now_ms))
            .unwrap_or(0)
    }

    /// Schedule tick: remember the active profile (it drives the fan mode and
    /// the Auto deadband pair) and, when permitted, walk the working setpoint
    /// to the profile target. Holds freeze the setpoint; small differences
    /// under the change threshold are left alone.
    pub fn apply_schedule(
        &mut self,
        comfort: ComfortMode,
        move_setpoint: bool,
        now_ms: u64,
    ) -> bool {
        self.active_comfort = comfort;

        if !move_setpoint || self.hold_active(now_ms) || self.settings.mode == OperatingMode::Off {
            return false;
        }

        let profile = self.settings.comfort.get(comfort);
        let target = match self.settings.mode {
            OperatingMode::Heat | OperatingMode::Auto => profile.heat_set_point,
            OperatingMode::Cool => profile.cool_set_point,
            OperatingMode::Off => return false,
        };

        if (self.settings.setpoint_f - target).abs() > self.config.schedule_change_threshold_f {
            self.settings.setpoint_f = target;
            true
        } else {
            false
        }
    }

    /// One evaluation pass. Returns the per-terminal edges produced by this
    /// pass; an unchanged decision returns no commands.
    pub fn tick(&mut self, now_ms: u64) -> Vec<RelayCommand> {
        self.expire_hold_if_needed(now_ms);

        let previous = self.outputs;
        self.evaluate(now_ms);
        self.outputs.changes_from(previous)
    }

    fn expire_hold_if_needed(&mut self, now_ms: u64) {
        if let Some(hold) = self.hold {
            if let Some(end) = hold.expires_at_ms {
                if now_ms >= end {
                    self.hold = None;
                }
            }
        }
    }

    fn evaluate(&mut self, now_ms: u64) {
        if self.settings.mode == OperatingMode::Off {
            self.force_all_off(now_ms);
            return;
        }

        // No usable reading: fail safe rather than act on stale data.
        if !self.is_sensor_valid(now_ms) {
            self.force_all_off(now_ms);
            return;
        }

        if let Some(window) = self.dissipation {
            if window.expired(now_ms) {
                self.dissipation = None;
                self.outputs = OutputState {
                    heat: false,
                    cool: false,
                    fan: self.idle_fan(),
                };
                self.state = ControlState::Idle;
            } else {
                // Absorbing: fan circulates residual air, nothing else moves.
                self.outputs = OutputState {
                    heat: false,
                    cool: false,
                    fan: true,
                };
                self.state = match window.kind {
                    DissipationKind::Heat => ControlState::DissipatingAfterHeat,
                    DissipationKind::Cool => ControlState::DissipatingAfterCool,
                };
            }
            return;
        }

        let corrected = self.corrected_temp_f();
        let setpoint = self.settings.setpoint_f;
        let heat_differential = self.settings.thresholds.heat_differential;
        let cool_differential = self.settings.thresholds.cool_differential;
        let heat_min_on_ms = self.settings.thresholds.heat_min_on_ms();
        let cool_min_on_ms = self.settings.thresholds.cool_min_on_ms();
        let compressor_off_ms = self.settings.thresholds.compressor_min_cycle_off_ms();
        let heat_dissipation_ms = self.settings.thresholds.heat_dissipation_ms();
        let cool_dissipation_ms = self.settings.thresholds.cool_dissipation_ms();

        let mode = self.settings.mode;
        let auto_enabled = mode == OperatingMode::Auto && self.settings.thresholds.auto_heat_cool;
        let heat_permitted = mode == OperatingMode::Heat || auto_enabled;
        let cool_permitted = mode == OperatingMode::Cool || auto_enabled;

        let (wants_heat, wants_cool) = match mode {
            OperatingMode::Heat => (corrected < setpoint - heat_differential, false),
            OperatingMode::Cool => (false, corrected > setpoint + cool_differential),
            OperatingMode::Auto if auto_enabled => {
                let (heat_setpoint, cool_setpoint) = self.auto_setpoints(now_ms);
                // Wider margin than the single-mode band so heat and cool
                // cannot hunt against each other.
                (
                    corrected < heat_setpoint - (heat_differential + 1.0),
                    corrected > cool_setpoint + (cool_differential + 1.0),
                )
            }
            _ => (false, false),
        };

        let was = self.outputs;

        let heat_held_on = was.heat
            && heat_permitted
            && self.guards.is_active(GuardId::HeatMinOn, now_ms, heat_min_on_ms);
        let cool_held_on = was.cool
            && cool_permitted
            && self.guards.is_active(GuardId::CoolMinOn, now_ms, cool_min_on_ms);
        let compressor_resting =
            self.guards
                .is_active(GuardId::CompressorOff, now_ms, compressor_off_ms);

        let mut heat_on = heat_permitted && (wants_heat || heat_held_on);
        let mut cool_on = cool_permitted && ((wants_cool && !compressor_resting) || cool_held_on);

        // Heat wins when both would fire (possible only at the widened
        // deadband edges); and a pass that ends a call never energizes the
        // opposite output in the same pass.
        if heat_on && cool_on {
            cool_on = false;
        }
        if was.heat && !heat_on {
            cool_on = false;
        }
        if was.cool && !cool_on {
            heat_on = false;
        }

        if was.heat && !heat_on {
            self.guards.clear(GuardId::HeatMinOn);
        }
        if was.cool && !cool_on {
            self.guards.clear(GuardId::CoolMinOn);
            // Compressor rest is keyed on the output edge itself.
            self.guards.start(GuardId::CompressorOff, now_ms);
        }
        if !was.heat && heat_on {
            self.guards.start(GuardId::HeatMinOn, now_ms);
        }
        if !was.cool && cool_on {
            self.guards.start(GuardId::CoolMinOn, now_ms);
        }

        if was.heat && !heat_on && heat_dissipation_ms > 0 {
            self.dissipation = Some(DissipationWindow::begin(
                DissipationKind::Heat,
                now_ms,
                heat_dissipation_ms,
            ));
            self.outputs = OutputState {
                heat: false,
                cool: false,
                fan: true,
            };
            self.state = ControlState::DissipatingAfterHeat;
            return;
        }
        if was.cool && !cool_on && cool_dissipation_ms > 0 {
            self.dissipation = Some(DissipationWindow::begin(
                DissipationKind::Cool,
                now_ms,
                cool_dissipation_ms,
            ));
            self.outputs = OutputState {
                heat: false,
                cool: false,
                fan: true,
            };
            self.state = ControlState::DissipatingAfterCool;
            return;
        }

        let fan_on = heat_on || cool_on || self.idle_fan();
        self.outputs = OutputState {
            heat: heat_on,
            cool: cool_on,
            fan: fan_on,
        };
        self.state = if heat_on {
            ControlState::Heating
        } else if cool_on {
            ControlState::Cooling
        } else {
            ControlState::Idle
        };
    }

    /// Immediate shutdown path shared by mode Off and sensor loss. Min-on
    /// guards are bypassed; the compressor rest window still begins if the
    /// compressor was running, since it physically stopped either way.
    fn force_all_off(&mut self, now_ms: u64) {
        if self.outputs.cool {
            self.guards.start(GuardId::CompressorOff, now_ms);
        }
        self.guards.clear(GuardId::HeatMinOn);
        self.guards.clear(GuardId::CoolMinOn);
        self.dissipation = None;
        self.outputs = OutputState::OFF;
        self.state = ControlState::Idle;
    }

    /// Auto-mode deadband pair: the held setpoint straddled by the minimum
    /// delta, otherwise the active profile's pair, widened symmetrically
    /// around its midpoint whenever it is narrower than the minimum delta.
    fn auto_setpoints(&self, now_ms: u64) -> (f32, f32) {
        let delta = self.settings.thresholds.heat_cool_min_delta;

        let (mut heat_setpoint, mut cool_setpoint) = match self.hold {
            Some(hold) if self.hold_active(now_ms) => (
                hold.setpoint_f - delta / 2.0,
                hold.setpoint_f + delta / 2.0,
            ),
            _ => {
                let profile = self.settings.comfort.get(self.active_comfort);
                (profile.heat_set_point, profile.cool_set_point)
            }
        };

        if cool_setpoint - heat_setpoint < delta {
            let midpoint = (heat_setpoint + cool_setpoint) / 2.0;
            heat_setpoint = midpoint - delta / 2.0;
            cool_setpoint = midpoint + delta / 2.0;
        }
        (heat_setpoint, cool_setpoint)
    }

    fn idle_fan(&self) -> bool {
        self.current_fan_mode() == FanMode::On
    }

    pub fn current_fan_mode(&self) -> FanMode {
        self.settings.comfort.get(self.active_comfort).fan_mode
    }

    fn guard_threshold_ms(&self, id: GuardId) -> u64 {
        match id {
            GuardId::HeatMinOn => self.settings.thresholds.heat_min_on_ms(),
            GuardId::CoolMinOn => self.settings.thresholds.cool_min_on_ms(),
            GuardId::CompressorOff => self.settings.thresholds.compressor_min_cycle_off_ms(),
        }
    }

    pub fn guard_active(&self, id: GuardId, now_ms: u64) -> bool {
        self.guards
            .is_active(id, now_ms, self.guard_threshold_ms(id))
    }

    pub fn guards_active(&self, now_ms: u64) -> Vec<&'static str> {
        GuardId::ALL
            .into_iter()
            .filter(|&id| self.guard_active(id, now_ms))
            .map(GuardId::as_str)
            .collect()
    }

    pub fn dissipation_remaining_seconds(&self, now_ms: u64) -> Option<f32> {
        self.dissipation
            .map(|window| window.remaining_ms(now_ms) as f32 / 1_000.0)
    }

    pub fn status(
        &self,
        now_ms: u64,
        schedule_enabled: bool,
        next_schedule_event_epoch: Option<i64>,
        time_synced: bool,
        timezone: &str,
    ) -> ControllerStatus {
        ControllerStatus {
            current_temp: self.corrected_temp_f(),
            raw_temp: self.raw_temp_f,
            target_temp: self.settings.setpoint_f,
            mode: self.settings.mode.as_str(),
            state: self.state.as_str(),
            heat: self.outputs.heat,
            cool: self.outputs.cool,
            fan: self.outputs.fan,
            fan_mode: self.current_fan_mode().as_str(),
            active_comfort: self.active_comfort.as_str(),
            sensor_valid: self.is_sensor_valid(now_ms),
            hold_active: self.hold_active(now_ms),
            hold_indefinite: self.hold_indefinite(),
            hold_remaining_min: self.hold_remaining_ms(now_ms) / 60_000,
            guards_active: self.guards_active(now_ms),
            compressor_rest_remaining_secs: self.guards.remaining_ms(
                GuardId::CompressorOff,
                now_ms,
                self.settings.thresholds.compressor_min_cycle_off_ms(),
            ) / 1_000,
            dissipation_remaining_seconds: self.dissipation_remaining_seconds(now_ms),
            schedule_enabled,
            next_schedule_event_epoch,
            time_synced,
            timezone: timezone.to_string(),
        }
    }

    pub fn state_payload(&self, now_ms: u64) -> ControllerStatePayload {
        ControllerStatePayload {
            temp: self.corrected_temp_f(),
            target: self.settings.setpoint_f,
            mode: self.settings.mode.as_str(),
            state: self.state.as_str(),
            heat: self.outputs.heat,
            cool: self.outputs.cool,
            fan: self.outputs.fan,
            hold_active: self.hold_active(now_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Terminal;

    fn engine(mode: OperatingMode) -> RelayEngine {
        let mut settings = ControlSettings::default();
        settings.mode = mode;
        RelayEngine::new(ControlLoopConfig::default(), settings)
    }

    fn step(engine: &mut RelayEngine, temp_f: f32, now_ms: u64) -> Vec<RelayCommand> {
        engine.update_reading(temp_f, now_ms);
        engine.tick(now_ms)
    }

    fn no_dissipation(engine: &mut RelayEngine) {
        engine
            .set_threshold(ThresholdKey::HeatDissipationTime, 0.0)
            .unwrap();
        engine
            .set_threshold(ThresholdKey::CoolDissipationTime, 0.0)
            .unwrap();
    }

    #[test]
    fn heat_call_starts_past_the_differential() {
        let mut engine = engine(OperatingMode::Heat);

        // Default setpoint 70, differential 0.5: 69.5 is not yet a call.
        step(&mut engine, 69.5, 1_000);
        assert_eq!(engine.state(), ControlState::Idle);
        assert!(!engine.outputs().heat);

        let commands = step(&mut engine, 69.3, 2_000);
        assert_eq!(engine.state(), ControlState::Heating);
        assert!(engine.outputs().heat);
        assert!(engine.outputs().fan);
        assert!(commands.contains(&RelayCommand {
            terminal: Terminal::W,
            energized: true,
        }));
    }

    #[test]
    fn min_on_guard_holds_heat_through_a_temperature_jump() {
        let mut engine = engine(OperatingMode::Heat);
        no_dissipation(&mut engine);

        step(&mut engine, 69.3, 1_000);
        assert!(engine.outputs().heat);

        // One second later the room reads 75; the guard keeps heat on.
        step(&mut engine, 75.0, 2_000);
        assert!(engine.outputs().heat);
        assert_eq!(engine.state(), ControlState::Heating);

        // Still held just before the 300 s minimum elapses.
        step(&mut engine, 75.0, 300_999);
        assert!(engine.outputs().heat);

        // Released the instant the guard expires.
        let commands = step(&mut engine, 75.0, 301_000);
        assert!(!engine.outputs().heat);
        assert_eq!(engine.state(), ControlState::Idle);
        assert!(commands.contains(&RelayCommand {
            terminal: Terminal::W,
            energized: false,
        }));
    }

    #[test]
    fn compressor_lockout_defers_cooling_until_rest_elapses() {
        let mut engine = engine(OperatingMode::Cool);
        no_dissipation(&mut engine);

        step(&mut engine, 76.0, 1_000);
        assert!(engine.outputs().cool);

        // Satisfied after the minimum on-time: compressor drops at T0.
        let t0 = 302_000;
        step(&mut engine, 69.0, t0);
        assert!(!engine.outputs().cool);
        assert!(engine.guard_active(GuardId::CompressorOff, t0));

        // Condition comes right back, call stays deferred through the rest.
        step(&mut engine, 76.0, t0 + 1_000);
        assert!(!engine.outputs().cool);
        step(&mut engine, 76.0, t0 + 299_000);
        assert!(!engine.outputs().cool);
        assert_eq!(engine.state(), ControlState::Idle);

        // Taken at the first eligible tick.
        step(&mut engine, 76.0, t0 + 300_000);
        assert!(engine.outputs().cool);
        assert_eq!(engine.state(), ControlState::Cooling);
    }

    #[test]
    fn dissipation_runs_the_fan_and_suppresses_other_calls() {
        let mut engine = engine(OperatingMode::Heat);
        engine
            .set_threshold(ThresholdKey::HeatDissipationTime, 60.0)
            .unwrap();
        engine
            .set_threshold(ThresholdKey::HeatMinOnTime, 60.0)
            .unwrap();

        step(&mut engine, 69.0, 0);
        assert!(engine.outputs().heat);

        // Satisfied after min-on: heat ends and the fan keeps running.
        let t0 = 61_000;
        let commands = step(&mut engine, 72.0, t0);
        assert_eq!(engine.state(), ControlState::DissipatingAfterHeat);
        assert_eq!(
            engine.outputs(),
            OutputState {
                heat: false,
                cool: false,
                fan: true,
            }
        );
        assert!(commands.contains(&RelayCommand {
            terminal: Terminal::W,
            energized: false,
        }));

        // A strong cooling condition inside the window changes nothing,
        // even after switching the mode to Cool.
        engine.set_mode(OperatingMode::Cool);
        step(&mut engine, 82.0, t0 + 30_000);
        assert_eq!(engine.state(), ControlState::DissipatingAfterHeat);
        assert!(engine.outputs().fan);
        assert!(!engine.outputs().cool);
        step(&mut engine, 82.0, t0 + 59_999);
        assert_eq!(engine.state(), ControlState::DissipatingAfterHeat);

        // Window closes: back to Idle, fan off, no call in the same pass.
        step(&mut engine, 82.0, t0 + 60_000);
        assert_eq!(engine.state(), ControlState::Idle);
        assert_eq!(engine.outputs(), OutputState::OFF);

        // The cooling call lands on the next pass.
        step(&mut engine, 82.0, t0 + 61_000);
        assert!(engine.outputs().cool);
    }

    #[test]
    fn cool_shutdown_enters_dissipation_and_starts_rest_together() {
        let mut engine = engine(OperatingMode::Cool);
        engine
            .set_threshold(ThresholdKey::CoolMinOnTime, 60.0)
            .unwrap();

        step(&mut engine, 76.0, 0);
        assert!(engine.outputs().cool);

        let t0 = 61_000;
        step(&mut engine, 69.0, t0);
        assert_eq!(engine.state(), ControlState::DissipatingAfterCool);
        assert!(engine.outputs().fan);
        assert!(engine.guard_active(GuardId::CompressorOff, t0));

        // Default cool dissipation is 30 s.
        step(&mut engine, 76.0, t0 + 30_000);
        assert_eq!(engine.state(), ControlState::Idle);

        // Past the window the rest guard still defers the next call.
        step(&mut engine, 76.0, t0 + 31_000);
        assert!(!engine.outputs().cool);
        assert!(engine.guard_active(GuardId::CompressorOff, t0 + 31_000));
        step(&mut engine, 76.0, t0 + 300_000);
        assert!(engine.outputs().cool);
    }

    #[test]
    fn off_forces_idle_bypassing_guards_and_dissipation() {
        let mut engine = engine(OperatingMode::Heat);

        step(&mut engine, 69.0, 1_000);
        assert!(engine.outputs().heat);
        assert!(engine.guard_active(GuardId::HeatMinOn, 2_000));

        engine.set_mode(OperatingMode::Off);
        let commands = step(&mut engine, 69.0, 2_000);

        assert_eq!(engine.outputs(), OutputState::OFF);
        assert_eq!(engine.state(), ControlState::Idle);
        // No fan run-on after a commanded stop.
        assert!(engine.dissipation_remaining_seconds(2_000).is_none());
        assert!(commands.contains(&RelayCommand {
            terminal: Terminal::W,
            energized: false,
        }));
        assert!(commands.contains(&RelayCommand {
            terminal: Terminal::G,
            energized: false,
        }));
    }

    #[test]
    fn compressor_rest_survives_a_trip_through_off() {
        let mut engine = engine(OperatingMode::Cool);
        no_dissipation(&mut engine);

        step(&mut engine, 76.0, 1_000);
        assert!(engine.outputs().cool);

        // Commanded off mid-call: the compressor physically stopped, so the
        // rest window starts here.
        engine.set_mode(OperatingMode::Off);
        let t0 = 5_000;
        step(&mut engine, 76.0, t0);
        assert_eq!(engine.outputs(), OutputState::OFF);

        engine.set_mode(OperatingMode::Cool);
        step(&mut engine, 76.0, t0 + 10_000);
        assert!(!engine.outputs().cool);
        assert!(engine.guard_active(GuardId::CompressorOff, t0 + 10_000));

        step(&mut engine, 76.0, t0 + 300_000);
        assert!(engine.outputs().cool);
    }

    #[test]
    fn auto_mode_does_nothing_without_the_permission_flag() {
        let mut engine = engine(OperatingMode::Auto);

        step(&mut engine, 55.0, 1_000);
        assert_eq!(engine.outputs(), OutputState::OFF);
        assert_eq!(engine.state(), ControlState::Idle);

        engine.set_auto_heat_cool(true);
        step(&mut engine, 55.0, 2_000);
        assert!(engine.outputs().heat);
    }

    #[test]
    fn auto_mode_widens_a_narrow_profile_pair() {
        let mut engine = engine(OperatingMode::Auto);
        engine.set_auto_heat_cool(true);
        no_dissipation(&mut engine);
        // Home pair 70/72 is narrower than the 5 degree minimum delta, so the
        // effective pair is 68.5/73.5.
        engine
            .set_comfort_profile(
                ComfortMode::Home,
                ComfortProfile {
                    heat_set_point: 70.0,
                    cool_set_point: 72.0,
                    fan_mode: FanMode::Auto,
                },
            )
            .unwrap();

        // Heat fires below 68.5 - 1.5 = 67.0.
        step(&mut engine, 67.2, 1_000);
        assert_eq!(engine.outputs(), OutputState::OFF);
        step(&mut engine, 66.8, 2_000);
        assert!(engine.outputs().heat);
    }

    #[test]
    fn auto_mode_cools_past_the_widened_band() {
        let mut engine = engine(OperatingMode::Auto);
        engine.set_auto_heat_cool(true);
        engine
            .set_comfort_profile(
                ComfortMode::Home,
                ComfortProfile {
                    heat_set_point: 70.0,
                    cool_set_point: 72.0,
                    fan_mode: FanMode::Auto,
                },
            )
            .unwrap();

        // Cool fires above 73.5 + 1.5 = 75.0.
        step(&mut engine, 74.8, 1_000);
        assert_eq!(engine.outputs(), OutputState::OFF);
        step(&mut engine, 75.2, 2_000);
        assert!(engine.outputs().cool);
        assert!(!engine.outputs().heat);
    }

    #[test]
    fn auto_mode_hold_builds_deadband_around_held_setpoint() {
        let mut engine = engine(OperatingMode::Auto);
        engine.set_auto_heat_cool(true);

        engine.set_setpoint(70.0);
        engine.enter_hold(None, 1_000);

        // Held pair is 67.5/72.5; heat fires below 67.5 - 1.5 = 66.0.
        step(&mut engine, 66.5, 2_000);
        assert_eq!(engine.outputs(), OutputState::OFF);
        step(&mut engine, 65.5, 3_000);
        assert!(engine.outputs().heat);
    }

    #[test]
    fn mutual_exclusion_holds_across_a_temperature_sweep() {
        let mut engine = engine(OperatingMode::Auto);
        engine.set_auto_heat_cool(true);
        no_dissipation(&mut engine);
        engine
            .set_threshold(ThresholdKey::HeatMinOnTime, 60.0)
            .unwrap();
        engine
            .set_threshold(ThresholdKey::CoolMinOnTime, 60.0)
            .unwrap();

        let profile = [
            55.0, 60.0, 68.0, 72.0, 80.0, 88.0, 75.0, 66.0, 58.0, 71.0, 90.0, 50.0,
        ];
        for (index, temp) in profile.into_iter().enumerate() {
            let now_ms = index as u64 * 61_000;
            step(&mut engine, temp, now_ms);
            let outputs = engine.outputs();
            assert!(
                !(outputs.heat && outputs.cool),
                "heat and cool both energized at {temp}"
            );
        }
    }

    #[test]
    fn ending_a_call_never_starts_the_opposite_in_the_same_pass() {
        let mut engine = engine(OperatingMode::Auto);
        engine.set_auto_heat_cool(true);
        no_dissipation(&mut engine);
        engine
            .set_threshold(ThresholdKey::HeatMinOnTime, 60.0)
            .unwrap();

        step(&mut engine, 60.0, 0);
        assert!(engine.outputs().heat);

        // Past min-on, the room jumps far above the cool band.
        step(&mut engine, 85.0, 61_000);
        assert!(!engine.outputs().heat);
        assert!(!engine.outputs().cool);
        assert_eq!(engine.state(), ControlState::Idle);

        step(&mut engine, 85.0, 62_000);
        assert!(engine.outputs().cool);
    }

    #[test]
    fn repeated_tick_at_the_same_instant_is_idempotent() {
        let mut engine = engine(OperatingMode::Heat);

        let first = step(&mut engine, 69.0, 1_000);
        assert!(!first.is_empty());
        let outputs = engine.outputs();
        let guards = engine.guards;

        let second = engine.tick(1_000);
        assert!(second.is_empty());
        assert_eq!(engine.outputs(), outputs);
        assert_eq!(engine.guards, guards);
    }

    #[test]
    fn threshold_edit_shortens_a_running_guard() {
        let mut engine = engine(OperatingMode::Heat);
        no_dissipation(&mut engine);

        step(&mut engine, 69.0, 0);
        assert!(engine.outputs().heat);

        // Satisfied at 100 s: the default 300 s guard still holds heat on.
        step(&mut engine, 72.0, 100_000);
        assert!(engine.outputs().heat);

        // Shortening the minimum to 60 s releases it on the next pass.
        engine
            .set_threshold(ThresholdKey::HeatMinOnTime, 60.0)
            .unwrap();
        step(&mut engine, 72.0, 101_000);
        assert!(!engine.outputs().heat);
    }

    #[test]
    fn rejected_threshold_mutation_leaves_timers_untouched() {
        let mut engine = engine(OperatingMode::Cool);
        no_dissipation(&mut engine);

        step(&mut engine, 76.0, 1_000);
        step(&mut engine, 69.0, 302_000);
        assert!(engine.guard_active(GuardId::CompressorOff, 302_000));
        let guards = engine.guards;

        let err = engine
            .set_threshold(ThresholdKey::CompressorMinCycleOff, 90.0)
            .unwrap_err();
        assert!(err.is_safety());
        assert_eq!(engine.guards, guards);
        assert_eq!(engine.settings().thresholds.compressor_min_cycle_off, 300);
    }

    #[test]
    fn stale_sensor_forces_outputs_off() {
        let mut engine = engine(OperatingMode::Heat);

        step(&mut engine, 69.0, 0);
        assert!(engine.outputs().heat);

        // No samples for the 120 s staleness window.
        let commands = engine.tick(120_000);
        assert_eq!(engine.outputs(), OutputState::OFF);
        assert!(commands.contains(&RelayCommand {
            terminal: Terminal::W,
            energized: false,
        }));

        // A fresh sample recovers control.
        step(&mut engine, 69.0, 121_000);
        assert!(engine.outputs().heat);
    }

    #[test]
    fn continuous_fan_runs_while_idle() {
        let mut engine = engine(OperatingMode::Heat);
        engine
            .set_comfort_profile(
                ComfortMode::Home,
                ComfortProfile {
                    heat_set_point: 70.0,
                    cool_set_point: 74.0,
                    fan_mode: FanMode::On,
                },
            )
            .unwrap();

        step(&mut engine, 72.0, 1_000);
        assert_eq!(
            engine.outputs(),
            OutputState {
                heat: false,
                cool: false,
                fan: true,
            }
        );
        assert_eq!(engine.state(), ControlState::Idle);

        // Off still drops everything, fan included.
        engine.set_mode(OperatingMode::Off);
        engine.tick(2_000);
        assert_eq!(engine.outputs(), OutputState::OFF);
    }

    #[test]
    fn schedule_moves_setpoint_only_past_the_change_threshold() {
        let mut engine = engine(OperatingMode::Heat);

        engine.set_setpoint(70.3);
        assert!(!engine.apply_schedule(ComfortMode::Home, true, 1_000));
        assert_eq!(engine.settings().setpoint_f, 70.3);

        engine.set_setpoint(74.0);
        assert!(engine.apply_schedule(ComfortMode::Home, true, 2_000));
        assert_eq!(engine.settings().setpoint_f, 70.0);
    }

    #[test]
    fn schedule_targets_cool_setpoint_in_cool_mode() {
        let mut engine = engine(OperatingMode::Cool);

        engine.set_setpoint(70.0);
        assert!(engine.apply_schedule(ComfortMode::Home, true, 1_000));
        assert_eq!(engine.settings().setpoint_f, 74.0);

        // Disabled schedule still records the profile for fan lookup.
        assert!(!engine.apply_schedule(ComfortMode::Sleep, false, 2_000));
        assert_eq!(engine.active_comfort(), ComfortMode::Sleep);
        assert_eq!(engine.settings().setpoint_f, 74.0);
    }

    #[test]
    fn hold_freezes_the_schedule_until_released() {
        let mut engine = engine(OperatingMode::Heat);

        engine.set_setpoint(72.0);
        engine.enter_hold(None, 1_000);
        assert!(engine.hold_indefinite());

        assert!(!engine.apply_schedule(ComfortMode::Away, true, 2_000));
        assert_eq!(engine.settings().setpoint_f, 72.0);

        engine.exit_hold();
        assert!(engine.apply_schedule(ComfortMode::Away, true, 3_000));
        assert_eq!(engine.settings().setpoint_f, 62.0);
    }

    #[test]
    fn timed_hold_expires_lazily() {
        let mut engine = engine(OperatingMode::Heat);

        engine.set_setpoint(72.0);
        engine.enter_hold(Some(60_000), 1_000);
        assert!(engine.hold_active(30_000));
        assert_eq!(engine.hold_remaining_ms(31_000), 30_000);

        assert!(!engine.hold_active(61_000));
        step(&mut engine, 72.0, 61_500);
        assert!(engine.apply_schedule(ComfortMode::Away, true, 62_000));
        assert_eq!(engine.settings().setpoint_f, 62.0);
    }

    #[test]
    fn status_reports_guards_and_dissipation() {
        let mut engine = engine(OperatingMode::Heat);
        engine
            .set_threshold(ThresholdKey::HeatMinOnTime, 60.0)
            .unwrap();
        engine
            .set_threshold(ThresholdKey::HeatDissipationTime, 60.0)
            .unwrap();

        step(&mut engine, 69.0, 0);
        let status = engine.status(1_000, true, None, true, "America/Los_Angeles");
        assert_eq!(status.state, "HEATING");
        assert!(status.guards_active.contains(&"heatMinOn"));
        assert_eq!(status.dissipation_remaining_seconds, None);

        step(&mut engine, 72.0, 61_000);
        let status = engine.status(61_000, true, None, true, "America/Los_Angeles");
        assert_eq!(status.state, "DISSIPATING_AFTER_HEAT");
        assert_eq!(status.dissipation_remaining_seconds, Some(60.0));
    }

    #[test]
    fn corrected_temp_applies_the_offset_before_comparison() {
        let mut engine = engine(OperatingMode::Heat);
        engine
            .set_threshold(ThresholdKey::TemperatureCorrection, -2.0)
            .unwrap();

        // Raw 71 reads as 69 after correction, which is past the 69.5 band.
        step(&mut engine, 71.0, 1_000);
        assert!(engine.outputs().heat);
        assert_eq!(engine.corrected_temp_f(), 69.0);
    }
}
