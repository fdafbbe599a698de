use std::{
    env,
    error::Error,
    io::{self, BufRead},
    path::Path,
    process,
    rc::Rc,
    sync::mpsc,
    thread,
    time::Duration,
};

use catapult::{
    Board, ButtonRole, CatapultConfig, CatapultController, Clock, InterruptHandle,
    PeripheralManager, ServoRole, SimulatedLine, SimulatedPeripheralManager, SystemClock,
    ui::format_status,
};
use chrono::Local;
use fern::Dispatch;
use log::{error, info, warn};

#[derive(Debug, PartialEq)]
pub enum UserCommand {
    Press(ButtonRole),
    Fire,
    Toggle(ServoRole),
    Status,
    Quit,
    NoOp,
}

impl UserCommand {
    fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let command = match (words.next(), words.next()) {
            (None, _) => UserCommand::NoOp,
            (Some("press"), Some("elastics")) => UserCommand::Press(ButtonRole::Elastics),
            (Some("press"), None | Some("trigger")) => UserCommand::Press(ButtonRole::Trigger),
            (Some("fire"), _) => UserCommand::Fire,
            (Some("toggle"), Some("trigger")) => UserCommand::Toggle(ServoRole::Trigger),
            (Some("toggle"), None | Some("elastics")) => UserCommand::Toggle(ServoRole::Elastics),
            (Some("status"), _) => UserCommand::Status,
            (Some("quit" | "exit"), _) => UserCommand::Quit,
            _ => return None,
        };
        Some(command)
    }
}

/// How long a `press` command holds a simulated button down.
const PRESS_HOLD: Duration = Duration::from_millis(250);

fn setup_logger(config: &CatapultConfig) -> Result<(), Box<dyn Error>> {
    let mut dispatch = Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(config.level_filter()?)
        .chain(io::stdout());

    if let Some(path) = &config.log_file {
        dispatch = dispatch.chain(fern::log_file(path)?);
    }
    dispatch.apply()?;

    Ok(())
}

fn load_config() -> Result<CatapultConfig, Box<dyn Error>> {
    match env::args().nth(1) {
        Some(path) => Ok(CatapultConfig::load(Path::new(&path))?),
        None => Ok(CatapultConfig::default()),
    }
}

/// Simulated button lines the `press` command can drive.
struct Buttons {
    trigger: Option<SimulatedLine>,
    elastics: Option<SimulatedLine>,
}

fn build_manager(
    config: &CatapultConfig,
    clock: Rc<dyn Clock>,
) -> Result<(Box<dyn PeripheralManager>, Buttons), Box<dyn Error>> {
    match config.board {
        Board::Simulated => {
            let mut manager = SimulatedPeripheralManager::new(clock);
            let mut line = |role: ButtonRole| {
                let polarity = config.button_settings(role).polarity;
                manager.line(&config.button_port(role), polarity)
            };
            let buttons = Buttons {
                trigger: Some(line(ButtonRole::Trigger)),
                elastics: Some(line(ButtonRole::Elastics)),
            };
            let manager: Box<dyn PeripheralManager> = Box::new(manager);
            Ok((manager, buttons))
        }
        #[cfg(feature = "rpi")]
        Board::RaspberryPi3 => {
            let manager: Box<dyn PeripheralManager> =
                Box::new(catapult::rpi::RpiPeripheralManager::new());
            let buttons = Buttons {
                trigger: None,
                elastics: None,
            };
            Ok((manager, buttons))
        }
        board => Err(format!("no peripheral backend for board {}", board).into()),
    }
}

fn spawn_input_thread(input_tx: mpsc::Sender<UserCommand>, interrupt: InterruptHandle) {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let Some(command) = UserCommand::parse(&line) else {
                println!("commands: press [trigger|elastics], fire, toggle [elastics|trigger], status, quit");
                continue;
            };
            // The main thread may be blocked inside a firing sequence.
            if matches!(command, UserCommand::Quit) {
                interrupt.interrupt();
            }
            if input_tx.send(command).is_err() {
                break;
            }
        }
    });
}

fn main() {
    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("catapult: {}", e);
            process::exit(2);
        }
    };
    if let Err(e) = setup_logger(&config) {
        eprintln!("catapult: cannot set up logging: {}", e);
        process::exit(2);
    }

    println!("catapult ({} board, {:?}).", config.board, config.variant);
    let clock: Rc<dyn Clock> = Rc::new(SystemClock::new());
    let (manager, buttons) = match build_manager(&config, Rc::clone(&clock)) {
        Ok(built) => built,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    let poll_interval = config.poll_interval();
    let log_target = config.log_target.clone();
    let mut controller = CatapultController::new(manager, Rc::clone(&clock), config, log_target);

    if let Err(e) = controller.start() {
        error!("start failed: {}", e);
        process::exit(1);
    }

    // User input from the stdin thread to the main thread
    let (input_tx, input_rx) = mpsc::channel::<UserCommand>();
    spawn_input_thread(input_tx, controller.interrupt_handle());

    loop {
        match input_rx.try_recv() {
            Ok(UserCommand::Press(role)) => {
                let line = match role {
                    ButtonRole::Trigger => buttons.trigger.as_ref(),
                    ButtonRole::Elastics => buttons.elastics.as_ref(),
                };
                let level = controller.config().button_settings(role).polarity.pressed_level();
                match line {
                    Some(line) => line.pulse(clock.now(), PRESS_HOLD, level),
                    None => warn!("{} button is not simulated on this board", role),
                }
            }
            Ok(UserCommand::Fire) => {
                if let Err(e) = controller.fire() {
                    println!("fire error: {}", e);
                }
            }
            Ok(UserCommand::Toggle(role)) => match controller.toggle(role) {
                Ok(angle) => println!("{} servo at {}°", role, angle),
                Err(e) => println!("toggle error: {}", e),
            },
            Ok(UserCommand::Status) => println!("{}", format_status(&controller)),
            Ok(UserCommand::Quit) => {
                println!("shutdown");
                break;
            }
            Err(mpsc::TryRecvError::Disconnected) => {
                println!("input closed");
                break;
            }
            _ => {}
        }

        for outcome in controller.poll() {
            if let Err(e) = outcome.result {
                warn!("{:?} from {} failed: {}", outcome.action, outcome.port, e);
            }
        }

        thread::sleep(poll_interval);
    }

    match controller.stop() {
        Ok(()) => info!("stopped"),
        Err(e) => {
            for failure in &e.failures {
                error!("{}", failure);
            }
            process::exit(1);
        }
    }
}

#[cfg(test)]
mod main_tests {
    use super::*;

    #[test]
    fn role_words_are_checked() {
        assert_eq!(
            UserCommand::parse("press"),
            Some(UserCommand::Press(ButtonRole::Trigger))
        );
        assert_eq!(
            UserCommand::parse("toggle trigger"),
            Some(UserCommand::Toggle(ServoRole::Trigger))
        );
        assert_eq!(UserCommand::parse("press foo"), None);
        assert_eq!(UserCommand::parse("toggle foo"), None);
        assert_eq!(UserCommand::parse(""), Some(UserCommand::NoOp));
    }
}
