use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum GuardId {
    HeatMinOn,
    CoolMinOn,
    CompressorOff,
}

impl GuardId {
    pub const ALL: [GuardId; 3] = [Self::HeatMinOn, Self::CoolMinOn, Self::CompressorOff];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::HeatMinOn => "heatMinOn",
            Self::CoolMinOn => "coolMinOn",
            Self::CompressorOff => "compressorOff",
        }
    }
}

/// Equipment-protection guards. Only start timestamps are stored; activity is
/// computed against the caller's `now` and threshold on every query, so an
/// edited threshold is honored immediately and no cached flag can go stale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProtectionGuards {
    heat_min_on_start_ms: Option<u64>,
    cool_min_on_start_ms: Option<u64>,
    compressor_off_start_ms: Option<u64>,
}

impl ProtectionGuards {
    pub fn start(&mut self, id: GuardId, now_ms: u64) {
        *self.slot_mut(id) = Some(now_ms);
    }

    pub fn clear(&mut self, id: GuardId) {
        *self.slot_mut(id) = None;
    }

    pub fn is_active(&self, id: GuardId, now_ms: u64, threshold_ms: u64) -> bool {
        self.slot(id)
            .map(|start| now_ms.saturating_sub(start) < threshold_ms)
            .unwrap_or(false)
    }

    pub fn remaining_ms(&self, id: GuardId, now_ms: u64, threshold_ms: u64) -> u64 {
        self.slot(id)
            .map(|start| threshold_ms.saturating_sub(now_ms.saturating_sub(start)))
            .unwrap_or(0)
    }

    pub fn started_at(&self, id: GuardId) -> Option<u64> {
        self.slot(id)
    }

    fn slot(&self, id: GuardId) -> Option<u64> {
        match id {
            GuardId::HeatMinOn => self.heat_min_on_start_ms,
            GuardId::CoolMinOn => self.cool_min_on_start_ms,
            GuardId::CompressorOff => self.compressor_off_start_ms,
        }
    }

    fn slot_mut(&mut self, id: GuardId) -> &mut Option<u64> {
        match id {
            GuardId::HeatMinOn => &mut self.heat_min_on_start_ms,
            GuardId::CoolMinOn => &mut self.cool_min_on_start_ms,
            GuardId::CompressorOff => &mut self.compressor_off_start_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DissipationKind {
    Heat,
    Cool,
}

/// Post-call fan run-on window. The end instant is fixed when the window
/// begins, so the exit check is a single comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DissipationWindow {
    pub kind: DissipationKind,
    pub ends_at_ms: u64,
}

impl DissipationWindow {
    pub fn begin(kind: DissipationKind, now_ms: u64, duration_ms: u64) -> Self {
        Self {
            kind,
            ends_at_ms: now_ms + duration_ms,
        }
    }

    pub fn expired(&self, now_ms: u64) -> bool {
        now_ms >= self.ends_at_ms
    }

    pub fn remaining_ms(&self, now_ms: u64) -> u64 {
        self.ends_at_ms.saturating_sub(now_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_is_active_strictly_inside_the_window() {
        let mut guards = ProtectionGuards::default();
        guards.start(GuardId::CoolMinOn, 10_000);

        assert!(guards.is_active(GuardId::CoolMinOn, 10_000, 300_000));
        assert!(guards.is_active(GuardId::CoolMinOn, 309_999, 300_000));
        // Expires exactly at the threshold, no extra tick needed.
        assert!(!guards.is_active(GuardId::CoolMinOn, 310_000, 300_000));
    }

    #[test]
    fn unstarted_guard_is_inert() {
        let guards = ProtectionGuards::default();
        assert!(!guards.is_active(GuardId::HeatMinOn, 0, u64::MAX));
        assert_eq!(guards.remaining_ms(GuardId::HeatMinOn, 0, 300_000), 0);
    }

    #[test]
    fn threshold_edit_takes_effect_immediately() {
        let mut guards = ProtectionGuards::default();
        guards.start(GuardId::CompressorOff, 0);

        assert!(guards.is_active(GuardId::CompressorOff, 200_000, 300_000));
        // User shortens the threshold mid-window; guard is instantly inert.
        assert!(!guards.is_active(GuardId::CompressorOff, 200_000, 180_000));
        // And lengthening re-arms it without any new start.
        assert!(guards.is_active(GuardId::CompressorOff, 200_000, 600_000));
    }

    #[test]
    fn clear_drops_the_start_stamp() {
        let mut guards = ProtectionGuards::default();
        guards.start(GuardId::HeatMinOn, 5_000);
        guards.clear(GuardId::HeatMinOn);

        assert!(!guards.is_active(GuardId::HeatMinOn, 5_001, 300_000));
        assert_eq!(guards.started_at(GuardId::HeatMinOn), None);
    }

    #[test]
    fn restart_rebases_the_window() {
        let mut guards = ProtectionGuards::default();
        guards.start(GuardId::CoolMinOn, 0);
        guards.start(GuardId::CoolMinOn, 250_000);

        assert!(guards.is_active(GuardId::CoolMinOn, 400_000, 300_000));
        assert_eq!(
            guards.remaining_ms(GuardId::CoolMinOn, 400_000, 300_000),
            150_000
        );
    }

    #[test]
    fn dissipation_window_stores_an_end_instant() {
        let window = DissipationWindow::begin(DissipationKind::Heat, 1_000, 60_000);

        assert_eq!(window.ends_at_ms, 61_000);
        assert!(!window.expired(60_999));
        assert!(window.expired(61_000));
        assert_eq!(window.remaining_ms(31_000), 30_000);
        assert_eq!(window.remaining_ms(90_000), 0);
    }
}
