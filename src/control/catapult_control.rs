use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::config::{CatapultConfig, ReentryPolicy};
use crate::core::{
    ButtonAction, ButtonEvent, ButtonHandle, Clock, FiringPlan, FiringState, FiringStep,
    FiringTimings, PeripheralManager, RangeEnd, ServoHandle, ServoRole,
};
use crate::error::{FireError, HardwareError, ShutdownError, StartError};

/// Cross-thread request to abandon the current wait.
#[derive(Clone, Default, Debug)]
pub struct InterruptHandle {
    flag: Arc<AtomicBool>,
}

impl InterruptHandle {
    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Result of one press edge dispatched by [`CatapultController::poll`].
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub port: String,
    pub action: ButtonAction,
    pub result: Result<(), FireError>,
}

/// Owns the servos and buttons of one catapult and runs its sequences.
///
/// `fire` blocks for the whole sequence. Button lines keep being sampled
/// during its waits so presses are not lost; what happens to them is
/// decided by the configured [`ReentryPolicy`].
pub struct CatapultController {
    manager: Box<dyn PeripheralManager>,
    clock: Rc<dyn Clock>,
    config: CatapultConfig,
    timings: FiringTimings,
    log_target: String,
    elastics: Option<ServoHandle>,
    trigger: Option<ServoHandle>,
    buttons: Vec<ButtonHandle>,
    state: FiringState,
    started: bool,
    busy: bool,
    queued: bool,
    interrupt: InterruptHandle,
}

impl CatapultController {
    pub fn new(
        manager: Box<dyn PeripheralManager>,
        clock: Rc<dyn Clock>,
        config: CatapultConfig,
        log_target: impl Into<String>,
    ) -> Self {
        CatapultController {
            manager,
            clock,
            timings: config.timing.timings(),
            config,
            log_target: log_target.into(),
            elastics: None,
            trigger: None,
            buttons: Vec::new(),
            state: FiringState::Idle,
            started: false,
            busy: false,
            queued: false,
            interrupt: InterruptHandle::default(),
        }
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    /// Opens and configures every port, then parks the mechanism at rest.
    /// Nothing stays open when this fails.
    pub fn start(&mut self) -> Result<(), StartError> {
        if self.started {
            return Err(StartError::AlreadyStarted);
        }
        // An interrupt only cancels the run it was raised in.
        self.interrupt.clear();

        let target = self.log_target.as_str();
        debug!(target: target, "PWM: {:?}", self.manager.pwm_list());
        debug!(target: target, "GPIO: {:?}", self.manager.gpio_list());

        if let Err(e) = self.acquire() {
            error!(target: self.log_target.as_str(), "hardware unavailable: {}", e);
            self.release_all();
            return Err(e.into());
        }
        self.started = true;

        if self.elastics.is_some() && self.trigger.is_some() {
            let rest = FiringPlan::rest(&self.timings);
            if let Err(e) = self.run_plan(&rest) {
                error!(target: self.log_target.as_str(), "rest pass failed: {}", e);
                self.release_all();
                self.started = false;
                return Err(e.into());
            }
            self.state = FiringState::Idle;
        }

        info!(target: self.log_target.as_str(), "Catapult ready");
        Ok(())
    }

    pub fn initialize(&mut self) -> Result<(), StartError> {
        self.start()
    }

    /// Releases every handle, carrying on past failures.
    pub fn stop(&mut self) -> Result<(), ShutdownError> {
        if !self.started {
            return Ok(());
        }
        self.started = false;

        let failures = self.release_all();
        info!(target: self.log_target.as_str(), "hardware released");

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ShutdownError { failures })
        }
    }

    pub fn shutdown(&mut self) -> Result<(), ShutdownError> {
        self.stop()
    }

    /// Samples every button once and runs the action of each press edge.
    pub fn poll(&mut self) -> Vec<ActionOutcome> {
        let mut outcomes = Vec::new();

        for (port, action) in self.sample_presses() {
            let result = match action {
                ButtonAction::Fire => self.fire(),
                ButtonAction::Toggle(role) => self.toggle(role).map(|_| ()),
            };
            outcomes.push(ActionOutcome {
                port,
                action,
                result,
            });
        }

        outcomes
    }

    /// Runs the full firing sequence, plus one queued repeat if a press
    /// arrived meanwhile under [`ReentryPolicy::Queue`].
    pub fn fire(&mut self) -> Result<(), FireError> {
        if !self.started {
            return Err(FireError::NotStarted);
        }
        if self.busy {
            return Err(FireError::Busy);
        }
        if self.elastics.is_none() {
            return Err(FireError::MissingServo(ServoRole::Elastics));
        }
        if self.trigger.is_none() {
            return Err(FireError::MissingServo(ServoRole::Trigger));
        }

        let plan = FiringPlan::fire(&self.timings);
        self.busy = true;
        self.queued = false;

        let mut result = self.run_plan(&plan);
        while result.is_ok() && self.queued {
            self.queued = false;
            info!(target: self.log_target.as_str(), "firing queued press");
            result = self.run_plan(&plan);
        }

        self.queued = false;
        self.busy = false;
        self.state = FiringState::Idle;

        match &result {
            Ok(()) => info!(target: self.log_target.as_str(), "fired"),
            Err(e) => error!(target: self.log_target.as_str(), "firing aborted: {}", e),
        }
        result
    }

    /// Moves one servo to the opposite end of its range.
    pub fn toggle(&mut self, role: ServoRole) -> Result<f64, FireError> {
        if !self.started {
            return Err(FireError::NotStarted);
        }
        if self.busy {
            return Err(FireError::Busy);
        }

        let servo = self.servo_mut(role).ok_or(FireError::MissingServo(role))?;
        let angle = servo
            .toggle()
            .map_err(|source| FireError::Toggle { role, source })?;

        info!(target: self.log_target.as_str(), "Button pressed change {} angle to {}", role, angle);
        Ok(angle)
    }

    pub fn state(&self) -> FiringState {
        self.state
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn config(&self) -> &CatapultConfig {
        &self.config
    }

    pub fn servo(&self, role: ServoRole) -> Option<&ServoHandle> {
        match role {
            ServoRole::Elastics => self.elastics.as_ref(),
            ServoRole::Trigger => self.trigger.as_ref(),
        }
    }

    pub fn buttons(&self) -> &[ButtonHandle] {
        &self.buttons
    }

    fn servo_mut(&mut self, role: ServoRole) -> Option<&mut ServoHandle> {
        match role {
            ServoRole::Elastics => self.elastics.as_mut(),
            ServoRole::Trigger => self.trigger.as_mut(),
        }
    }

    fn acquire(&mut self) -> Result<(), HardwareError> {
        for role in self.config.servo_roles() {
            let profile = self
                .config
                .servo_settings(role)
                .profile(role)
                .map_err(|e| HardwareError::Unavailable {
                    port: self.config.servo_port(role),
                    reason: e.to_string(),
                })?;
            let port = self.config.servo_port(role);

            let pwm = self.manager.open_pwm(&port)?;
            let servo = ServoHandle::open(role, pwm)?;
            let servo = match role {
                ServoRole::Elastics => self.elastics.insert(servo),
                ServoRole::Trigger => self.trigger.insert(servo),
            };

            servo.set_angle_range(profile.min_angle, profile.max_angle)?;
            servo.set_pulse_duration_range(profile.min_pulse, profile.max_pulse)?;
            servo.set_enabled(true)?;
            debug!(target: self.log_target.as_str(), "{} servo ready on {}", role, port);
        }

        for (role, action) in self.config.bindings() {
            let settings = self.config.button_settings(role);
            let port = self.config.button_port(role);

            let input = self.manager.open_input(&port, settings.polarity)?;
            let mut button = ButtonHandle::open(role, input, settings.polarity, settings.debounce())?;
            button.register(action);
            self.buttons.push(button);
            debug!(target: self.log_target.as_str(), "{} button on {} -> {:?}", role, port, action);
        }

        Ok(())
    }

    /// Closes everything that is open and forgets it. Each close is
    /// attempted regardless of earlier failures.
    fn release_all(&mut self) -> Vec<HardwareError> {
        let mut failures = Vec::new();

        for (role, slot) in [
            (ServoRole::Elastics, &mut self.elastics),
            (ServoRole::Trigger, &mut self.trigger),
        ] {
            if let Some(mut servo) = slot.take() {
                if let Err(e) = servo.close() {
                    error!(target: self.log_target.as_str(), "Error closing {} servo: {}", role, e);
                    failures.push(e);
                }
            }
        }

        for mut button in self.buttons.drain(..) {
            button.unregister();
            if let Err(e) = button.close() {
                error!(target: self.log_target.as_str(), "Error closing {} button: {}", button.role(), e);
                failures.push(e);
            }
        }

        self.state = FiringState::Idle;
        failures
    }

    fn run_plan(&mut self, plan: &FiringPlan) -> Result<(), FireError> {
        for step in plan.steps() {
            if let Err(source) = self.apply(step) {
                error!(target: self.log_target.as_str(), "{:?} failed: {}", step.state, source);
                self.secure();
                return Err(FireError::Hardware {
                    step: step.state,
                    source,
                });
            }
            self.state = step.state;

            if !self.wait(step.hold) {
                warn!(target: self.log_target.as_str(), "wait after {:?} interrupted", step.state);
                self.secure();
                return Err(FireError::Interrupted { step: step.state });
            }
        }

        Ok(())
    }

    fn apply(&mut self, step: &FiringStep) -> Result<(), HardwareError> {
        let servo = self.servo_mut(step.servo).ok_or_else(|| HardwareError::Unavailable {
            port: step.servo.to_string(),
            reason: "servo not opened".to_string(),
        })?;

        match step.end {
            RangeEnd::Max => servo.move_to_max(),
            RangeEnd::Min => servo.move_to_min(),
        }
    }

    /// Best effort: block the shaft with the trigger.
    fn secure(&mut self) {
        if let Some(trigger) = self.trigger.as_mut() {
            match trigger.move_to_max() {
                Ok(()) => self.state = FiringState::TriggerClosed,
                Err(e) => error!(target: self.log_target.as_str(), "cannot close trigger: {}", e),
            }
        }
    }

    /// Sleeps in poll-sized slices, sampling buttons in between. Returns
    /// `false` if interrupted.
    fn wait(&mut self, duration: Duration) -> bool {
        let deadline = self.clock.now() + duration;
        let slice = self.config.poll_interval();

        loop {
            if self.interrupt.is_interrupted() {
                return false;
            }

            let now = self.clock.now();
            if now >= deadline {
                return true;
            }

            self.clock.sleep(slice.min(deadline - now));

            for (port, action) in self.sample_presses() {
                self.defer(&port, action);
            }
        }
    }

    fn defer(&mut self, port: &str, action: ButtonAction) {
        match (action, self.config.reentry) {
            (ButtonAction::Fire, ReentryPolicy::Queue) if !self.queued => {
                self.queued = true;
                info!(target: self.log_target.as_str(), "press on {} queued", port);
            }
            (ButtonAction::Fire, ReentryPolicy::Queue) => {
                warn!(target: self.log_target.as_str(), "press on {} dropped, one fire already queued", port);
            }
            _ => {
                warn!(target: self.log_target.as_str(), "press on {} ignored: sequence in progress", port);
            }
        }
    }

    fn sample_presses(&mut self) -> Vec<(String, ButtonAction)> {
        let now = self.clock.now();
        let mut presses = Vec::new();

        for button in self.buttons.iter_mut() {
            match button.poll(now) {
                Ok(Some(ButtonEvent::Pressed)) => {
                    if let Some(action) = button.action() {
                        presses.push((button.port().to_string(), action));
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(target: self.log_target.as_str(), "cannot read {} button: {}", button.role(), e)
                }
            }
        }

        presses
    }
}

impl Drop for CatapultController {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!(target: self.log_target.as_str(), "shutdown on drop: {}", e);
        }
    }
}
