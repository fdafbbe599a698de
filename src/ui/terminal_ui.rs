use crate::{ButtonHandle, CatapultController, FiringState, ServoHandle, ServoRole};

pub struct DisplayData {
    pub firing_state: String,
    pub started: bool,
    pub servos: Vec<String>,
    pub buttons: Vec<String>,
}

pub fn format_firing_state(state: &FiringState) -> String {
    match state {
        FiringState::Idle => "IDLE".to_string(),
        FiringState::TriggerClosed => "TRIGGER CLOSED".to_string(),
        FiringState::ElasticsStretched => "ELASTICS STRETCHED".to_string(),
        FiringState::TriggerOpen => "TRIGGER OPEN".to_string(),
        FiringState::ElasticsReleased => "ELASTICS RELEASED".to_string(),
    }
}

pub fn format_servo(servo: &ServoHandle) -> String {
    format!(
        "{} on {}: {:.1}° in [{:.1}, {:.1}]{}",
        servo.role(),
        servo.port(),
        servo.angle(),
        servo.min_angle(),
        servo.max_angle(),
        if servo.is_enabled() { "" } else { " (disabled)" }
    )
}

pub fn format_button(button: &ButtonHandle) -> String {
    format!(
        "{} on {}: {} -> {}",
        button.role(),
        button.port(),
        if button.is_pressed() { "pressed" } else { "released" },
        match button.action() {
            Some(action) => format!("{:?}", action),
            None => "unregistered".to_string(),
        }
    )
}

pub fn display_data(controller: &CatapultController) -> DisplayData {
    DisplayData {
        firing_state: format_firing_state(&controller.state()),
        started: controller.is_started(),
        servos: [ServoRole::Elastics, ServoRole::Trigger]
            .iter()
            .filter_map(|role| controller.servo(*role))
            .map(format_servo)
            .collect(),
        buttons: controller.buttons().iter().map(format_button).collect(),
    }
}

pub fn format_status(controller: &CatapultController) -> String {
    let data = display_data(controller);
    let mut out = String::new();

    out.push_str("--- Catapult ---\n");
    out.push_str(&format!("State: {}\n", data.firing_state));
    out.push_str(&format!("Started: {}\n", data.started));
    out.push_str("Servos:\n");
    if data.servos.is_empty() {
        out.push_str("  none open\n");
    }
    for servo in &data.servos {
        out.push_str(&format!("  - {}\n", servo));
    }
    out.push_str("Buttons:\n");
    if data.buttons.is_empty() {
        out.push_str("  none open\n");
    }
    for button in &data.buttons {
        out.push_str(&format!("  - {}\n", button));
    }
    out.push_str("----------------");

    out
}

#[cfg(test)]
mod terminal_ui_tests {
    use std::rc::Rc;

    use super::*;
    use crate::{CatapultConfig, SimulatedClock, SimulatedPeripheralManager};

    #[test]
    fn status_lists_open_hardware() {
        let clock = SimulatedClock::new();
        let manager = SimulatedPeripheralManager::new(Rc::new(clock.clone()));
        let mut controller = CatapultController::new(
            Box::new(manager),
            Rc::new(clock),
            CatapultConfig::default(),
            "test",
        );
        controller.start().unwrap();

        let status = format_status(&controller);

        assert!(status.contains("State: IDLE"));
        assert!(status.contains("elastics on PWM0: 0.0° in [0.0, 180.0]"));
        assert!(status.contains("trigger on PWM1: 90.0° in [0.0, 90.0]"));
        assert!(status.contains("trigger on GPIO21: released -> Fire"));

        controller.stop().unwrap();
        assert!(format_status(&controller).contains("none open"));
    }
}
