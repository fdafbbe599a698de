use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;
use std::time::Duration;

use crate::core::{Clock, DigitalInput, PeripheralManager, Polarity, PwmOutput};
use crate::error::HardwareError;

#[derive(Clone, Debug, PartialEq)]
pub enum HardwareEvent {
    Opened { port: String },
    Period { port: String, period: Duration },
    Pulse { port: String, width: Duration },
    Enabled { port: String, enabled: bool },
    Closed { port: String },
}

/// Ordered record of everything the simulated devices were asked to do.
#[derive(Clone, Default)]
pub struct Journal {
    events: Rc<RefCell<Vec<HardwareEvent>>>,
}

impl Journal {
    pub fn record(&self, event: HardwareEvent) {
        self.events.borrow_mut().push(event);
    }

    pub fn events(&self) -> Vec<HardwareEvent> {
        self.events.borrow().clone()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }

    /// `(port, width)` for every pulse write, in order.
    pub fn pulses(&self) -> Vec<(String, Duration)> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                HardwareEvent::Pulse { port, width } => Some((port.clone(), *width)),
                _ => None,
            })
            .collect()
    }

    pub fn pulses_on(&self, port: &str) -> Vec<Duration> {
        self.pulses()
            .into_iter()
            .filter(|(p, _)| p == port)
            .map(|(_, width)| width)
            .collect()
    }

    pub fn closed_ports(&self) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                HardwareEvent::Closed { port } => Some(port.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Failures to inject into the simulated devices. Shared with every device
/// the manager opens, so faults can be switched on after start.
#[derive(Default)]
struct FaultPlan {
    open: HashSet<String>,
    close: HashSet<String>,
    write: HashSet<String>,
}

#[derive(Clone, Copy)]
enum Fault {
    Open,
    Close,
    Write,
}

#[derive(Clone, Default)]
pub struct Faults {
    plan: Rc<RefCell<FaultPlan>>,
}

impl Faults {
    pub fn fail_open(&self, port: &str) {
        self.plan.borrow_mut().open.insert(port.to_string());
    }

    pub fn fail_close(&self, port: &str) {
        self.plan.borrow_mut().close.insert(port.to_string());
    }

    /// Every subsequent pulse write or level read on `port` fails.
    pub fn fail_writes(&self, port: &str) {
        self.plan.borrow_mut().write.insert(port.to_string());
    }

    pub fn heal(&self, port: &str) {
        let mut plan = self.plan.borrow_mut();
        plan.open.remove(port);
        plan.close.remove(port);
        plan.write.remove(port);
    }

    fn check(&self, kind: Fault, port: &str) -> bool {
        let plan = self.plan.borrow();
        match kind {
            Fault::Open => plan.open.contains(port),
            Fault::Close => plan.close.contains(port),
            Fault::Write => plan.write.contains(port),
        }
    }
}

fn io_error(port: &str, reason: &str) -> HardwareError {
    HardwareError::Io {
        port: port.to_string(),
        reason: reason.to_string(),
    }
}

pub struct SimulatedPwm {
    name: String,
    journal: Journal,
    faults: Faults,
    period: Duration,
}

impl SimulatedPwm {
    pub fn new(name: &str, journal: Journal) -> Self {
        Self::with_faults(name, journal, Faults::default())
    }

    pub fn with_faults(name: &str, journal: Journal, faults: Faults) -> Self {
        journal.record(HardwareEvent::Opened {
            port: name.to_string(),
        });

        Self {
            name: name.to_string(),
            journal,
            faults,
            period: Duration::ZERO,
        }
    }
}

impl PwmOutput for SimulatedPwm {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_period(&mut self, period: Duration) -> Result<(), HardwareError> {
        self.period = period;
        self.journal.record(HardwareEvent::Period {
            port: self.name.clone(),
            period,
        });
        Ok(())
    }

    fn set_pulse_width(&mut self, pulse: Duration) -> Result<(), HardwareError> {
        if self.faults.check(Fault::Write, &self.name) {
            return Err(io_error(&self.name, "pulse write failed"));
        }
        if pulse > self.period {
            return Err(io_error(&self.name, "pulse wider than period"));
        }

        self.journal.record(HardwareEvent::Pulse {
            port: self.name.clone(),
            width: pulse,
        });
        Ok(())
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<(), HardwareError> {
        self.journal.record(HardwareEvent::Enabled {
            port: self.name.clone(),
            enabled,
        });
        Ok(())
    }

    fn close(&mut self) -> Result<(), HardwareError> {
        // The close is recorded even when it reports failure, so callers can
        // check that every handle was asked to release.
        self.journal.record(HardwareEvent::Closed {
            port: self.name.clone(),
        });

        if self.faults.check(Fault::Close, &self.name) {
            return Err(io_error(&self.name, "close failed"));
        }
        Ok(())
    }
}

/// Electrical level of a simulated GPIO line over (virtual) time.
///
/// Levels are scheduled against the clock so button presses can be placed
/// in the middle of a blocking sequence.
#[derive(Clone)]
pub struct SimulatedLine {
    clock: Rc<dyn Clock>,
    levels: Rc<RefCell<BTreeMap<Duration, bool>>>,
}

impl SimulatedLine {
    pub fn new(clock: Rc<dyn Clock>, initial_high: bool) -> Self {
        let mut levels = BTreeMap::new();
        levels.insert(Duration::ZERO, initial_high);

        Self {
            clock,
            levels: Rc::new(RefCell::new(levels)),
        }
    }

    pub fn schedule(&self, at: Duration, high: bool) {
        self.levels.borrow_mut().insert(at, high);
    }

    pub fn set_high(&self, high: bool) {
        self.schedule(self.clock.now(), high);
    }

    /// Drives the line to `level` at `at` and back after `hold`.
    pub fn pulse(&self, at: Duration, hold: Duration, level: bool) {
        self.schedule(at, level);
        self.schedule(at + hold, !level);
    }

    pub fn is_high(&self) -> bool {
        let now = self.clock.now();
        self.levels
            .borrow()
            .range(..=now)
            .next_back()
            .map(|(_, high)| *high)
            .unwrap_or(true)
    }
}

pub struct SimulatedInput {
    name: String,
    line: SimulatedLine,
    journal: Journal,
    faults: Faults,
}

impl DigitalInput for SimulatedInput {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_high(&mut self) -> Result<bool, HardwareError> {
        if self.faults.check(Fault::Write, &self.name) {
            return Err(io_error(&self.name, "level read failed"));
        }
        Ok(self.line.is_high())
    }

    fn close(&mut self) -> Result<(), HardwareError> {
        self.journal.record(HardwareEvent::Closed {
            port: self.name.clone(),
        });

        if self.faults.check(Fault::Close, &self.name) {
            return Err(io_error(&self.name, "close failed"));
        }
        Ok(())
    }
}

/// In-memory board with two PWM channels and a bank of pulled-up inputs.
pub struct SimulatedPeripheralManager {
    clock: Rc<dyn Clock>,
    journal: Journal,
    faults: Faults,
    pwm_ports: Vec<String>,
    gpio_ports: Vec<String>,
    lines: HashMap<String, SimulatedLine>,
}

impl SimulatedPeripheralManager {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            clock,
            journal: Journal::default(),
            faults: Faults::default(),
            pwm_ports: vec!["PWM0".to_string(), "PWM1".to_string()],
            gpio_ports: (2..=27).map(|n| format!("GPIO{}", n)).collect(),
            lines: HashMap::new(),
        }
    }

    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    pub fn faults(&self) -> Faults {
        self.faults.clone()
    }

    /// The line behind `port`. On first use it rests at the released level
    /// of `polarity`, like a pull-up or pull-down would hold it.
    pub fn line(&mut self, port: &str, polarity: Polarity) -> SimulatedLine {
        self.lines
            .entry(port.to_string())
            .or_insert_with(|| {
                SimulatedLine::new(Rc::clone(&self.clock), !polarity.pressed_level())
            })
            .clone()
    }

    fn check_open(&self, known: &[String], port: &str) -> Result<(), HardwareError> {
        if !known.iter().any(|p| p == port) {
            return Err(HardwareError::Unavailable {
                port: port.to_string(),
                reason: "no such port".to_string(),
            });
        }
        if self.faults.check(Fault::Open, port) {
            return Err(HardwareError::Unavailable {
                port: port.to_string(),
                reason: "port is busy".to_string(),
            });
        }
        Ok(())
    }
}

impl PeripheralManager for SimulatedPeripheralManager {
    fn pwm_list(&self) -> Vec<String> {
        self.pwm_ports.clone()
    }

    fn gpio_list(&self) -> Vec<String> {
        self.gpio_ports.clone()
    }

    fn open_pwm(&mut self, name: &str) -> Result<Box<dyn PwmOutput>, HardwareError> {
        self.check_open(&self.pwm_ports, name)?;

        Ok(Box::new(SimulatedPwm::with_faults(
            name,
            self.journal.clone(),
            self.faults.clone(),
        )))
    }

    fn open_input(
        &mut self,
        name: &str,
        polarity: Polarity,
    ) -> Result<Box<dyn DigitalInput>, HardwareError> {
        self.check_open(&self.gpio_ports, name)?;
        self.journal.record(HardwareEvent::Opened {
            port: name.to_string(),
        });

        Ok(Box::new(SimulatedInput {
            name: name.to_string(),
            line: self.line(name, polarity),
            journal: self.journal.clone(),
            faults: self.faults.clone(),
        }))
    }
}

#[cfg(test)]
mod simulated_hardware_tests {
    use super::*;
    use crate::simulation::SimulatedClock;

    #[test]
    fn line_follows_schedule() {
        let clock = SimulatedClock::new();
        let line = SimulatedLine::new(Rc::new(clock.clone()), true);
        line.pulse(Duration::from_millis(100), Duration::from_millis(50), false);

        assert!(line.is_high());
        clock.advance(Duration::from_millis(100));
        assert!(!line.is_high(), "low while held");
        clock.advance(Duration::from_millis(49));
        assert!(!line.is_high());
        clock.advance(Duration::from_millis(1));
        assert!(line.is_high(), "released after hold");
    }

    #[test]
    fn unknown_and_faulted_ports_are_unavailable() {
        let clock = SimulatedClock::new();
        let mut manager = SimulatedPeripheralManager::new(Rc::new(clock));
        manager.faults().fail_open("PWM1");

        assert!(manager.open_pwm("PWM7").is_err());
        assert!(matches!(
            manager.open_pwm("PWM1"),
            Err(HardwareError::Unavailable { .. })
        ));
        assert!(manager.open_pwm("PWM0").is_ok());
        assert!(manager.open_input("GPIO21", Polarity::PressedWhenLow).is_ok());
    }

    #[test]
    fn inputs_rest_at_the_released_level() {
        let clock = SimulatedClock::new();
        let mut manager = SimulatedPeripheralManager::new(Rc::new(clock));

        let mut pulled_up = manager.open_input("GPIO21", Polarity::PressedWhenLow).unwrap();
        let mut pulled_down = manager.open_input("GPIO20", Polarity::PressedWhenHigh).unwrap();

        assert_eq!(pulled_up.is_high(), Ok(true));
        assert_eq!(pulled_down.is_high(), Ok(false));
    }

    #[test]
    fn write_faults_can_be_healed() {
        let journal = Journal::default();
        let faults = Faults::default();
        let mut pwm = SimulatedPwm::with_faults("PWM0", journal.clone(), faults.clone());
        pwm.set_period(Duration::from_millis(20)).unwrap();
        faults.fail_writes("PWM0");

        assert!(pwm.set_pulse_width(Duration::from_millis(1)).is_err());
        faults.heal("PWM0");
        assert!(pwm.set_pulse_width(Duration::from_millis(1)).is_ok());
        assert_eq!(journal.pulses_on("PWM0"), vec![Duration::from_millis(1)]);
    }
}
