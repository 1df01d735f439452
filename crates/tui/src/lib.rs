use std::io::{self, Stdout};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event as TerminalEvent, KeyEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use sqlnav_core::data_access::{Credentials, DataAccess};
use sqlnav_core::session::{advance, Event, Exit, Session};
use thiserror::Error;
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

mod dispatch;
mod keymap;
mod view;

use dispatch::{CommandDispatcher, Inbound};
use keymap::map_key_event;

const TICK_RATE: Duration = Duration::from_millis(120);
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum TuiError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub command_timeout: Option<Duration>,
}

type CrosstermTerminal = Terminal<CrosstermBackend<Stdout>>;

/// Runs the navigator until the operator quits, then closes every
/// connection the session opened.
pub fn run(
    access: Arc<dyn DataAccess>,
    bootstrap: Credentials,
    options: RunOptions,
) -> Result<Exit, TuiError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("sqlnav-worker")
        .build()?;

    let mut terminal = setup_terminal()?;
    let (session, run_result) = run_loop(&mut terminal, &runtime, &access, bootstrap, &options);
    let restore_result = restore_terminal(&mut terminal);

    close_connections(&runtime, access.as_ref(), session);
    runtime.shutdown_timeout(SHUTDOWN_GRACE);

    let exit = match run_result {
        Ok(exit) => exit,
        Err(error) => {
            restore_result?;
            return Err(error);
        }
    };
    restore_result?;
    Ok(exit)
}

fn setup_terminal() -> Result<CrosstermTerminal, TuiError> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut CrosstermTerminal) -> Result<(), TuiError> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

fn run_loop(
    terminal: &mut CrosstermTerminal,
    runtime: &Runtime,
    access: &Arc<dyn DataAccess>,
    bootstrap: Credentials,
    options: &RunOptions,
) -> (Session, Result<Exit, TuiError>) {
    let (sender, mut receiver) = mpsc::unbounded_channel();
    let stop = Arc::new(AtomicBool::new(false));
    let input = spawn_input_thread(sender.clone(), Arc::clone(&stop));
    let dispatcher = CommandDispatcher::new(
        runtime.handle().clone(),
        Arc::clone(access),
        sender,
        options.command_timeout,
    );

    let (session, commands) = Session::init(bootstrap);
    dispatcher.dispatch_all(commands);
    let outcome = drive(terminal, &dispatcher, &mut receiver, session);

    stop.store(true, Ordering::Relaxed);
    if input.join().is_err() {
        warn!("input thread panicked");
    }
    outcome
}

fn drive(
    terminal: &mut CrosstermTerminal,
    dispatcher: &CommandDispatcher,
    receiver: &mut UnboundedReceiver<Inbound>,
    mut session: Session,
) -> (Session, Result<Exit, TuiError>) {
    let mut tick = 0_usize;

    loop {
        if let Err(error) = terminal.draw(|frame| view::render(frame, &session, tick)) {
            return (session, Err(error.into()));
        }

        let event = match receiver.blocking_recv() {
            Some(Inbound::Tick) => {
                tick = tick.wrapping_add(1);
                continue;
            }
            Some(Inbound::Key(key)) => Event::Key(key),
            Some(Inbound::Message(message)) => Event::Message(message),
            Some(Inbound::InputFailed(error)) => return (session, Err(error.into())),
            None => return (session, Ok(Exit::Requested)),
        };

        let (next, commands) = advance(session, event);
        session = next;
        dispatcher.dispatch_all(commands);

        if let Some(exit) = session.exit() {
            info!(?exit, "leaving event loop");
            return (session, Ok(exit));
        }
    }
}

fn spawn_input_thread(sender: UnboundedSender<Inbound>, stop: Arc<AtomicBool>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while !stop.load(Ordering::Relaxed) {
            let inbound = match poll_input() {
                Ok(Some(inbound)) => inbound,
                Ok(None) => continue,
                Err(error) => {
                    let _ = sender.send(Inbound::InputFailed(error));
                    return;
                }
            };
            if sender.send(inbound).is_err() {
                return;
            }
        }
        debug!("input thread stopped");
    })
}

fn poll_input() -> io::Result<Option<Inbound>> {
    if !event::poll(TICK_RATE)? {
        return Ok(Some(Inbound::Tick));
    }
    match event::read()? {
        TerminalEvent::Key(key) if key.kind == KeyEventKind::Press => {
            Ok(map_key_event(key).map(Inbound::Key))
        }
        TerminalEvent::Resize(..) => Ok(Some(Inbound::Tick)),
        _ => Ok(None),
    }
}

fn close_connections(runtime: &Runtime, access: &dyn DataAccess, mut session: Session) {
    let handles = session.take_connections();
    if handles.is_empty() {
        return;
    }
    runtime.block_on(async {
        for handle in handles {
            if let Err(error) = access.close(handle).await {
                warn!(%handle, %error, "failed to close connection");
            }
        }
    });
}
