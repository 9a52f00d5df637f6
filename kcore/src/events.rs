//! Tick-driven event dispatch.
//!
//! Four slots (tick, second, minute, hour), each holding one plain
//! function pointer that defaults to a no-op. The timer interrupt calls
//! [`TickDispatcher::advance`] once per tick; the tick hook fires every
//! time, the coarser hooks fire on `ticks % (hz * interval) == 0`
//! boundaries. There is no queue and no ordering between slots beyond
//! the cadence arithmetic itself: a second can only fire on a tick that
//! has already fired.

pub type Hook = fn();

fn noop() {}

/// Monotonic tick counter plus the four callback slots.
pub struct TickDispatcher {
    ticks: u64,
    hz: u64,
    on_tick: Hook,
    on_second: Hook,
    on_minute: Hook,
    on_hour: Hook,
}

impl TickDispatcher {
    pub const fn new() -> TickDispatcher {
        TickDispatcher {
            ticks: 0,
            hz: 0,
            on_tick: noop,
            on_second: noop,
            on_minute: noop,
            on_hour: noop,
        }
    }

    /// The timer rate. Until this is set, only the tick hook fires.
    pub fn set_hz(&mut self, hz: u32) {
        self.hz = hz as u64;
    }

    pub fn register_tick(&mut self, hook: Hook) {
        self.on_tick = hook;
    }

    pub fn register_second(&mut self, hook: Hook) {
        self.on_second = hook;
    }

    pub fn register_minute(&mut self, hook: Hook) {
        self.on_minute = hook;
    }

    pub fn register_hour(&mut self, hook: Hook) {
        self.on_hour = hook;
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// One timer interrupt's worth of fan-out.
    pub fn advance(&mut self) {
        self.ticks += 1;
        (self.on_tick)();
        if self.hz == 0 {
            return;
        }
        if self.ticks % self.hz == 0 {
            (self.on_second)();
        }
        if self.ticks % (self.hz * 60) == 0 {
            (self.on_minute)();
        }
        if self.ticks % (self.hz * 3600) == 0 {
            (self.on_hour)();
        }
    }
}

impl Default for TickDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU64, Ordering};

    // Hooks are plain `fn()`, so the counters they bump have to be
    // statics. Each test owns its own set to stay independent of the
    // parallel test runner.

    #[test]
    fn cadence_at_60_hz() {
        static TICKS: AtomicU64 = AtomicU64::new(0);
        static SECONDS: AtomicU64 = AtomicU64::new(0);
        static MINUTES: AtomicU64 = AtomicU64::new(0);
        fn count_tick() {
            TICKS.fetch_add(1, Ordering::Relaxed);
        }
        fn count_second() {
            SECONDS.fetch_add(1, Ordering::Relaxed);
        }
        fn count_minute() {
            MINUTES.fetch_add(1, Ordering::Relaxed);
        }

        let mut dispatcher = TickDispatcher::new();
        dispatcher.set_hz(60);
        dispatcher.register_tick(count_tick);
        dispatcher.register_second(count_second);
        dispatcher.register_minute(count_minute);

        // Exactly one second after 60 ticks, none before.
        for _ in 0..59 {
            dispatcher.advance();
        }
        assert_eq!(SECONDS.load(Ordering::Relaxed), 0);
        dispatcher.advance();
        assert_eq!(SECONDS.load(Ordering::Relaxed), 1);
        assert_eq!(TICKS.load(Ordering::Relaxed), 60);

        // After N ticks: floor(N / hz) seconds, floor(N / (hz * 60)) minutes.
        let n: u64 = 60 * 200;
        for _ in 60..n {
            dispatcher.advance();
        }
        assert_eq!(dispatcher.ticks(), n);
        assert_eq!(TICKS.load(Ordering::Relaxed), n);
        assert_eq!(SECONDS.load(Ordering::Relaxed), n / 60);
        assert_eq!(MINUTES.load(Ordering::Relaxed), n / (60 * 60));
    }

    #[test]
    fn unset_slots_are_noops() {
        let mut dispatcher = TickDispatcher::new();
        dispatcher.set_hz(1);
        for _ in 0..3600 {
            dispatcher.advance(); // would fire every slot if any were set
        }
        assert_eq!(dispatcher.ticks(), 3600);
    }

    #[test]
    fn without_hz_only_tick_fires() {
        static TICKS: AtomicU64 = AtomicU64::new(0);
        static SECONDS: AtomicU64 = AtomicU64::new(0);
        fn count_tick() {
            TICKS.fetch_add(1, Ordering::Relaxed);
        }
        fn count_second() {
            SECONDS.fetch_add(1, Ordering::Relaxed);
        }

        let mut dispatcher = TickDispatcher::new();
        dispatcher.register_tick(count_tick);
        dispatcher.register_second(count_second);
        for _ in 0..100 {
            dispatcher.advance();
        }
        assert_eq!(TICKS.load(Ordering::Relaxed), 100);
        assert_eq!(SECONDS.load(Ordering::Relaxed), 0);
    }
}
