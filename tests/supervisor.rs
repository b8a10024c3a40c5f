//! Host-level tests for the supervisor lifecycle, with every collaborator faked.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use alarm_portal::alarm::{AlarmOutputs, AlarmSwitch, StatusDisplay};
use alarm_portal::ap_config::ApCredentials;
use alarm_portal::supervisor::{
    ApRadio, Clock, Console, ExitCode, NetworkServices, Supervisor, is_shutdown_key,
};
use alarm_portal::{Error, Result};
use embassy_futures::block_on;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Event {
    StartDhcp,
    StartDns,
    StartHttp,
    EnableAp,
    Blue(bool),
    Status(bool),
    StopHttp,
    StopDns,
    StopDhcp,
    DisableAp,
    Farewell,
    Deinit,
}

type Log = Rc<RefCell<Vec<Event>>>;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Failing {
    Nothing,
    Dhcp,
    Dns,
    Http,
    Radio,
}

struct FakeRadio {
    log: Log,
    failing: Failing,
}

impl ApRadio for FakeRadio {
    async fn enable_ap(&mut self, credentials: &ApCredentials) -> Result<()> {
        assert_eq!(credentials.ssid(), "PICO_ALARME_AP");
        self.log.borrow_mut().push(Event::EnableAp);
        if self.failing == Failing::Radio {
            return Err(Error::ServiceStart);
        }
        Ok(())
    }

    async fn disable_ap(&mut self) {
        self.log.borrow_mut().push(Event::DisableAp);
    }

    async fn deinit(&mut self) {
        self.log.borrow_mut().push(Event::Deinit);
    }
}

struct FakeServices {
    log: Log,
    failing: Failing,
    pumps: usize,
}

impl FakeServices {
    fn start(&self, event: Event, failing: Failing, port: u16) -> Result<()> {
        self.log.borrow_mut().push(event);
        if self.failing == failing {
            return Err(Error::BindFailed { port });
        }
        Ok(())
    }
}

impl NetworkServices for FakeServices {
    async fn start_dhcp(&mut self) -> Result<()> {
        self.start(Event::StartDhcp, Failing::Dhcp, 67)
    }

    async fn start_dns(&mut self) -> Result<()> {
        self.start(Event::StartDns, Failing::Dns, 53)
    }

    async fn start_http(&mut self) -> Result<()> {
        self.start(Event::StartHttp, Failing::Http, 80)
    }

    async fn stop_http(&mut self) {
        self.log.borrow_mut().push(Event::StopHttp);
    }

    async fn stop_dns(&mut self) {
        self.log.borrow_mut().push(Event::StopDns);
    }

    async fn stop_dhcp(&mut self) {
        self.log.borrow_mut().push(Event::StopDhcp);
    }

    async fn pump(&mut self) {
        self.pumps += 1;
    }
}

#[derive(Debug, Default)]
struct Pins {
    log: Log,
    red: bool,
    green: bool,
    blue: bool,
    buzzer: bool,
    red_toggles: usize,
}

impl AlarmOutputs for Pins {
    fn set_red(&mut self, on: bool) {
        if on != self.red {
            self.red_toggles += 1;
        }
        self.red = on;
    }
    fn set_green(&mut self, on: bool) {
        self.green = on;
    }
    fn set_blue(&mut self, on: bool) {
        self.log.borrow_mut().push(Event::Blue(on));
        self.blue = on;
    }
    fn set_buzzer(&mut self, on: bool) {
        self.buzzer = on;
    }
}

struct FakeScreen {
    log: Log,
}

impl StatusDisplay for FakeScreen {
    fn show_status(&mut self, active: bool) -> Result<()> {
        self.log.borrow_mut().push(Event::Status(active));
        Ok(())
    }
    fn show_ap_disabled(&mut self) -> Result<()> {
        self.log.borrow_mut().push(Event::Farewell);
        Ok(())
    }
}

/// Console input plus what a web client does between keystrokes.
#[derive(Clone, Copy)]
enum Input {
    Nothing,
    Key(u8),
    Arm,
    Disarm,
}

struct ScriptedConsole<'a> {
    script: VecDeque<Input>,
    alarm: &'a AlarmSwitch,
}

impl Console for ScriptedConsole<'_> {
    fn poll_key(&mut self) -> Option<u8> {
        match self.script.pop_front().unwrap_or(Input::Key(b'q')) {
            Input::Nothing => None,
            Input::Key(key) => Some(key),
            Input::Arm => {
                self.alarm.set(true);
                None
            }
            Input::Disarm => {
                self.alarm.set(false);
                None
            }
        }
    }
}

/// Advances 100 ms on every reading.
#[derive(Default)]
struct SteppingClock {
    now: Cell<u64>,
}

impl Clock for SteppingClock {
    fn now_ms(&self) -> u64 {
        self.now.set(self.now.get() + 100);
        self.now.get()
    }
}

type TestSupervisor<'a> =
    Supervisor<'a, FakeRadio, FakeServices, Pins, FakeScreen, ScriptedConsole<'a>, SteppingClock>;

fn supervisor<'a>(
    log: &Log,
    failing: Failing,
    alarm: &'a AlarmSwitch,
    script: &[Input],
) -> TestSupervisor<'a> {
    Supervisor::new(
        FakeRadio {
            log: Rc::clone(log),
            failing,
        },
        FakeServices {
            log: Rc::clone(log),
            failing,
            pumps: 0,
        },
        Pins {
            log: Rc::clone(log),
            ..Pins::default()
        },
        FakeScreen {
            log: Rc::clone(log),
        },
        ScriptedConsole {
            script: script.iter().copied().collect(),
            alarm,
        },
        SteppingClock::default(),
        ApCredentials::new("PICO_ALARME_AP", "picoalarme123").unwrap(),
        alarm,
    )
}

#[test]
fn shutdown_keys() {
    for key in [b'd', b'D', b'q', b'Q'] {
        assert!(is_shutdown_key(key));
    }
    for key in [b'x', b'\r', b' ', 0] {
        assert!(!is_shutdown_key(key));
    }
}

#[test]
fn clean_run_brings_up_in_order_and_tears_down_in_reverse() {
    let log = Log::default();
    let alarm = AlarmSwitch::new();
    let mut supervisor = supervisor(
        &log,
        Failing::Nothing,
        &alarm,
        &[Input::Nothing, Input::Key(b'x'), Input::Key(b'd')],
    );

    let exit = block_on(supervisor.run());
    assert_eq!(exit, ExitCode::Clean);
    assert_eq!(exit.code(), 0);
    assert_eq!(supervisor.services().pumps, 3);
    assert!(!supervisor.ap_running());

    assert_eq!(
        *log.borrow(),
        vec![
            Event::Blue(false),
            Event::StartDhcp,
            Event::StartDns,
            Event::StartHttp,
            Event::EnableAp,
            Event::Blue(true),
            Event::Status(false),
            Event::StopHttp,
            Event::StopDns,
            Event::StopDhcp,
            Event::DisableAp,
            Event::Blue(false),
            Event::Farewell,
            Event::Deinit,
        ]
    );
    let pins = supervisor.outputs();
    assert!(!pins.red && !pins.green && !pins.blue && !pins.buzzer);
}

#[test]
fn dns_failure_unwinds_dhcp_and_exits_with_one() {
    let log = Log::default();
    let alarm = AlarmSwitch::new();
    let mut supervisor = supervisor(&log, Failing::Dns, &alarm, &[]);

    let exit = block_on(supervisor.run());
    assert_eq!(exit, ExitCode::InitFailed);
    assert_eq!(exit.code(), 1);
    assert_eq!(supervisor.services().pumps, 0);
    assert_eq!(
        *log.borrow(),
        vec![
            Event::Blue(false),
            Event::StartDhcp,
            Event::StartDns,
            Event::StopDhcp,
            Event::Blue(false),
        ]
    );
}

#[test]
fn radio_failure_stops_every_server_newest_first() {
    let log = Log::default();
    let alarm = AlarmSwitch::new();
    let mut supervisor = supervisor(&log, Failing::Radio, &alarm, &[]);

    assert_eq!(block_on(supervisor.run()), ExitCode::InitFailed);
    assert!(!supervisor.ap_running());
    assert_eq!(
        log.borrow()[1..],
        [
            Event::StartDhcp,
            Event::StartDns,
            Event::StartHttp,
            Event::EnableAp,
            Event::StopHttp,
            Event::StopDns,
            Event::StopDhcp,
            Event::Blue(false),
        ]
    );
}

#[test]
fn http_and_dhcp_failures_unwind_only_what_started() {
    let log = Log::default();
    let alarm = AlarmSwitch::new();
    let mut supervisor = supervisor(&log, Failing::Http, &alarm, &[]);
    assert_eq!(block_on(supervisor.run()), ExitCode::InitFailed);
    assert_eq!(
        log.borrow()[1..],
        [
            Event::StartDhcp,
            Event::StartDns,
            Event::StartHttp,
            Event::StopDns,
            Event::StopDhcp,
            Event::Blue(false),
        ]
    );

    let log = Log::default();
    let mut supervisor = self::supervisor(&log, Failing::Dhcp, &alarm, &[]);
    assert_eq!(block_on(supervisor.run()), ExitCode::InitFailed);
    assert_eq!(*log.borrow(), vec![Event::Blue(false), Event::StartDhcp]);
}

#[test]
fn alarm_changes_are_followed_while_running() {
    let log = Log::default();
    let alarm = AlarmSwitch::new();
    let mut script = vec![Input::Arm];
    script.extend([Input::Nothing; 12]);
    script.push(Input::Disarm);
    script.extend([Input::Nothing; 3]);
    script.push(Input::Key(b'Q'));
    let mut supervisor = supervisor(&log, Failing::Nothing, &alarm, &script);

    assert_eq!(block_on(supervisor.run()), ExitCode::Clean);
    assert!(!alarm.is_active());
    assert!(
        supervisor.outputs().red_toggles >= 2,
        "red blinked while the alarm was active"
    );

    let screens: Vec<_> = log
        .borrow()
        .iter()
        .copied()
        .filter(|event| matches!(event, Event::Status(_) | Event::Farewell))
        .collect();
    assert_eq!(
        screens,
        vec![
            Event::Status(false),
            Event::Status(true),
            Event::Status(false),
            Event::Farewell,
        ]
    );
    assert!(!supervisor.policy().is_active());
}
