//! Entry trampoline
//!
//! The first Rust code after reset: run the application once, and when it
//! comes back (for any reason) reset the whole system.

use core::fmt;

pub trait SystemReset {
    /// Request a full system reset. Does not return.
    fn system_reset(&mut self) -> !;

    /// Called when the application is about to be entered.
    ///
    /// Never called after the application returns: the reset follows
    /// with nothing in between.
    fn stage_changed(&mut self, _stage: Stage) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Stage {
    Booting,
    Running,
    /// Terminal. The application has returned and only a reset remains.
    Resetting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The application may only be entered once per boot
    AlreadyEntered { stage: Stage },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::AlreadyEntered { stage } => {
                write!(f, "application already entered (stage: {:?})", stage)
            }
        }
    }
}

#[cfg(any(test, feature = "use-std"))]
impl std::error::Error for Error {}

pub struct Trampoline<HW: SystemReset> {
    stage: Stage,
    hardware: HW,
}

impl<HW: SystemReset> Trampoline<HW> {
    pub fn new(hw: HW) -> Self {
        Self {
            stage: Stage::Booting,
            hardware: hw,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Run the application entry routine to completion.
    ///
    /// Only valid while `Booting`; the routine is called exactly once and
    /// the trampoline is left in `Resetting` however it ended. Nothing is
    /// logged or reported once the routine has returned.
    pub fn enter<F: FnOnce()>(&mut self, app: F) -> Result<(), Error> {
        if self.stage != Stage::Booting {
            return Err(Error::AlreadyEntered { stage: self.stage });
        }

        trace!("trampoline: {} -> {}", self.stage, Stage::Running);
        self.stage = Stage::Running;
        self.hardware.stage_changed(Stage::Running);

        run_app(app);
        self.stage = Stage::Resetting;
        Ok(())
    }

    /// The whole reset handler: enter the application, then reset.
    pub fn launch<F: FnOnce()>(mut self, app: F) -> ! {
        match self.enter(app) {
            Ok(()) => {}
            // Already ran once this boot, so it still ends in a reset.
            Err(Error::AlreadyEntered { stage }) => {
                trace!("trampoline: re-entry refused in {}", stage);
            }
        }
        self.hardware.system_reset()
    }
}

// An unwinding application counts as a return. On target the panic
// handler resets instead, which ends the same way.
#[cfg(any(test, feature = "use-std"))]
fn run_app<F: FnOnce()>(app: F) {
    let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(app));
}

#[cfg(not(any(test, feature = "use-std")))]
fn run_app<F: FnOnce()>(app: F) {
    app()
}

#[cfg(test)]
pub mod test {
    use super::{Error, Stage, SystemReset, Trampoline};
    use crate::sink::{CharSink, TxRegister, TxStatus};
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Event {
        Stage(Stage),
        AppStart,
        AppEnd,
        Tx(u8),
        Reset,
    }

    /// Payload the mock reset unwinds with, in place of restarting the process
    struct ResetRequested;

    /// Fake board: one log shared by the UART and the reset line, so the
    /// relative order of writes and resets can be checked.
    #[derive(Clone, Default)]
    struct Board {
        log: Arc<Mutex<Vec<Event>>>,
    }

    impl Board {
        fn push(&self, ev: Event) {
            self.log.lock().unwrap().push(ev);
        }

        fn events(&self) -> Vec<Event> {
            self.log.lock().unwrap().clone()
        }

        fn count(&self, ev: Event) -> usize {
            self.events().iter().filter(|e| **e == ev).count()
        }
    }

    impl TxRegister for Board {
        fn write_data(&mut self, byte: u8) {
            self.push(Event::Tx(byte));
        }

        fn tx_status(&mut self) -> TxStatus {
            TxStatus::Ready
        }
    }

    impl SystemReset for Board {
        fn system_reset(&mut self) -> ! {
            self.push(Event::Reset);
            panic::panic_any(ResetRequested)
        }

        fn stage_changed(&mut self, stage: Stage) {
            self.push(Event::Stage(stage));
        }
    }

    /// Runs `f`, returning true if it ended in a reset request
    fn resets<F: FnOnce()>(f: F) -> bool {
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(()) => false,
            Err(payload) => payload.downcast_ref::<ResetRequested>().is_some(),
        }
    }

    #[test]
    fn starts_booting() {
        let board = Board::default();
        let tramp = Trampoline::new(board.clone());
        assert_eq!(tramp.stage(), Stage::Booting);
        assert!(board.events().is_empty());
    }

    #[test]
    fn enter_runs_app_once() {
        let board = Board::default();
        let mut tramp = Trampoline::new(board.clone());

        let app_board = board.clone();
        tramp
            .enter(move || {
                app_board.push(Event::AppStart);
                app_board.push(Event::AppEnd);
            })
            .unwrap();

        assert_eq!(tramp.stage(), Stage::Resetting);
        assert_eq!(
            board.events(),
            vec![
                Event::Stage(Stage::Running),
                Event::AppStart,
                Event::AppEnd,
            ]
        );
        // Entering alone never resets
        assert_eq!(board.count(Event::Reset), 0);
    }

    #[test]
    fn enter_twice_is_refused() {
        let board = Board::default();
        let mut tramp = Trampoline::new(board.clone());
        tramp.enter(|| {}).unwrap();

        let app_board = board.clone();
        let res = tramp.enter(move || app_board.push(Event::AppStart));
        assert_eq!(
            res,
            Err(Error::AlreadyEntered {
                stage: Stage::Resetting
            })
        );
        assert_eq!(board.count(Event::AppStart), 0);
        assert_eq!(tramp.stage(), Stage::Resetting);
    }

    #[test]
    fn nothing_runs_between_return_and_reset() {
        let board = Board::default();
        let tramp = Trampoline::new(board.clone());

        let app_board = board.clone();
        assert!(resets(move || tramp.launch(move || app_board.push(Event::AppEnd))));

        // The hook only ever sees the way in
        assert_eq!(
            board.events(),
            vec![Event::Stage(Stage::Running), Event::AppEnd, Event::Reset]
        );
    }

    #[test]
    fn launch_resets_once_after_app() {
        let board = Board::default();
        let tramp = Trampoline::new(board.clone());

        let app_board = board.clone();
        assert!(resets(move || tramp.launch(move || {
            app_board.push(Event::AppStart);
            app_board.push(Event::AppEnd);
        })));

        let events = board.events();
        assert_eq!(board.count(Event::AppStart), 1);
        assert_eq!(board.count(Event::Reset), 1);
        assert_eq!(events.last(), Some(&Event::Reset));

        let app_end = events.iter().position(|e| *e == Event::AppEnd).unwrap();
        let reset = events.iter().position(|e| *e == Event::Reset).unwrap();
        assert!(app_end < reset);
    }

    #[test]
    fn launch_prints_ok_then_resets() {
        let board = Board::default();
        let tramp = Trampoline::new(board.clone());
        let mut sink = CharSink::new(board.clone());

        assert!(resets(move || tramp.launch(move || {
            sink.putchar('O' as i32);
            sink.putchar('K' as i32);
        })));

        let tail: Vec<Event> = board
            .events()
            .into_iter()
            .filter(|e| !matches!(e, Event::Stage(_)))
            .collect();
        assert_eq!(
            tail,
            vec![Event::Tx(0x4F), Event::Tx(0x4B), Event::Reset]
        );
    }

    #[test]
    fn panicking_app_still_resets() {
        let board = Board::default();
        let tramp = Trampoline::new(board.clone());

        let app_board = board.clone();
        assert!(resets(move || tramp.launch(move || {
            app_board.push(Event::AppStart);
            panic!("application fell over");
        })));

        assert_eq!(
            board.events(),
            vec![
                Event::Stage(Stage::Running),
                Event::AppStart,
                Event::Reset,
            ]
        );
    }

    #[test]
    fn launch_after_enter_skips_app() {
        let board = Board::default();
        let mut tramp = Trampoline::new(board.clone());
        tramp.enter(|| {}).unwrap();

        let app_board = board.clone();
        assert!(resets(move || tramp.launch(move || app_board.push(Event::AppStart))));

        assert_eq!(board.count(Event::AppStart), 0);
        assert_eq!(
            board.events(),
            vec![Event::Stage(Stage::Running), Event::Reset]
        );
    }
}
