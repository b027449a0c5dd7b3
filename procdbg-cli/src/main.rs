//! procdbg CLI - コマンドラインインターフェース
//!
//! ストアドプログラムデバッガ procdbg のREPLインターフェース。
//! 台本を再生するモックサーバーに対してセッションを実行します。

mod host;
mod script;

use clap::Parser;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use host::{ChannelHost, HostEvent};
use procdbg_core::parse::parse_location;
use procdbg_core::{
    BreakpointStatus, BreakpointStore, Command, DebugController, ExecutionInput, LineBreakpoint,
    NotificationLevel, Result, SessionConfig, SessionContext, StatusFlag, SuspendContext,
};
use procdbg_protocol::mock::{describe_reason, MockConnectionProvider, MockDebugger};
use procdbg_protocol::{ConnectionId, ObjectType, ProgramPosition, SchemaId};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use script::ProgramScript;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

const CONNECTION: ConnectionId = ConnectionId(1);
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);
const HISTORY_FILE: &str = ".procdbg_history";

/// procdbg - Stored Program Debugger
#[derive(Parser)]
#[command(name = "procdbg")]
#[command(version = "0.1.0")]
#[command(about = "Session-level debugger for database stored programs", long_about = None)]
struct Cli {
    /// Program script (TOML) to simulate. Defaults to a built-in demo
    #[arg(short, long)]
    script: Option<PathBuf>,

    /// Session configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Breakpoint to declare before the session starts (SCHEMA.PROGRAM:LINE)
    #[arg(short, long = "break", value_name = "LOCATION")]
    breakpoints: Vec<String>,

    /// Log filter, overrides RUST_LOG
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    println!("procdbg - Stored Program Debugger");
    println!("Version 0.1.0");
    println!();

    let script = match &cli.script {
        Some(path) => ProgramScript::load(path)?,
        None => ProgramScript::demo(),
    };
    let config = match &cli.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };

    let repl = Repl::start(&script, config, &cli.breakpoints)?;
    repl.run()
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

struct Repl {
    controller: DebugController,
    store: Arc<BreakpointStore>,
    events: Receiver<HostEvent>,
    default_type: ObjectType,
}

impl Repl {
    /// セッションを作成し、最初の停止位置まで進める
    fn start(script: &ProgramScript, config: SessionConfig, breakpoints: &[String]) -> Result<Self> {
        let server = Arc::new(MockDebugger::new(script.trace.clone()));
        let provider = Arc::new(MockConnectionProvider::new(CONNECTION, "simulation", server));
        let (host, events) = ChannelHost::new();
        let store = Arc::new(BreakpointStore::new());
        let default_type = script.target.object_type;

        for location in breakpoints {
            let position = parse_location(location, default_type)?;
            store.add(line_breakpoint(position));
        }

        let context = SessionContext::new(provider, Arc::new(host))
            .with_entry_resolver(Arc::new(script.entry_resolver()))
            .with_breakpoints(Arc::clone(&store))
            .with_config(config);
        let input = ExecutionInput::new(script.debug_target(), SchemaId::new(&script.target.schema));
        let controller = DebugController::new(input, context);

        println!("Debugging {}", script.target.qualified_name());
        println!();

        let repl = Self {
            controller,
            store,
            events,
            default_type,
        };
        repl.controller.session_initialized()?;
        repl.wait_for_stop();
        Ok(repl)
    }

    /// REPLループを実行する
    fn run(&self) -> Result<()> {
        println!("Type 'help' for available commands, 'quit' to exit.");
        println!();

        let mut rl = DefaultEditor::new()?;
        let history = home::home_dir().map(|home| home.join(HISTORY_FILE));
        if let Some(path) = &history {
            if rl.load_history(path).is_err() {
                debug!(path = %path.display(), "no history loaded");
            }
        }

        loop {
            self.drain_events();
            match rl.readline("(procdbg) ") {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }

                    rl.add_history_entry(line)?;

                    match self.handle_command(line) {
                        Ok(ControlFlow::Break(())) => break,
                        Ok(ControlFlow::Continue(())) => {}
                        Err(e) => eprintln!("Error: {}", e),
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("CTRL-C");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    println!("CTRL-D");
                    break;
                }
                Err(err) => {
                    eprintln!("Error: {:?}", err);
                    break;
                }
            }
        }

        if let Some(path) = &history {
            if let Err(e) = rl.save_history(path) {
                warn!(path = %path.display(), error = %e, "failed to save history");
            }
        }
        self.shutdown();
        Ok(())
    }

    fn handle_command(&self, line: &str) -> Result<ControlFlow<()>> {
        let Some(command) = Command::parse(line) else {
            println!("Unknown command: {}", line);
            println!("Type 'help' for available commands.");
            return Ok(ControlFlow::Continue(()));
        };

        if let Some(operation) = command.operation() {
            self.controller.perform(operation)?;
            self.wait_for_stop();
            return Ok(ControlFlow::Continue(()));
        }

        match command {
            Command::Help => print_help(),
            Command::Quit => return Ok(ControlFlow::Break(())),
            Command::Break(loc) => self.handle_break(&loc)?,
            Command::Delete(loc) => self.handle_delete(&loc)?,
            Command::Enable(loc) => self.handle_toggle(&loc, true)?,
            Command::Disable(loc) => self.handle_toggle(&loc, false)?,
            Command::Until(loc) => self.handle_until(&loc)?,
            Command::Backtrace => self.handle_backtrace(),
            Command::InfoBreakpoints => self.handle_info_breakpoints(),
            _ => println!("Command not yet implemented: {}", line),
        }
        Ok(ControlFlow::Continue(()))
    }

    /// Breakコマンドを処理する
    fn handle_break(&self, loc: &str) -> Result<()> {
        let position = parse_location(loc, self.default_type)?;
        let breakpoint = line_breakpoint(position);
        self.store.add(breakpoint.clone());

        // 登録結果はホストイベントとして表示される
        if self
            .controller
            .breakpoint_handler()
            .register_breakpoint(&breakpoint)
            .is_none()
        {
            println!("Breakpoint pending at {}", breakpoint.position);
        }
        Ok(())
    }

    /// Deleteコマンドを処理する
    fn handle_delete(&self, loc: &str) -> Result<()> {
        let position = parse_location(loc, self.default_type)?;
        let Some(breakpoint) = self.store.remove(&line_breakpoint(position.clone()).key()) else {
            println!("No breakpoint at {}", position);
            return Ok(());
        };

        // サーバーから削除された場合はホストイベントとして表示される
        if !self
            .controller
            .breakpoint_handler()
            .unregister_breakpoint(&breakpoint, false)
        {
            println!("Deleted breakpoint at {}", breakpoint.position);
        }
        Ok(())
    }

    /// Enable/Disableコマンドを処理する
    fn handle_toggle(&self, loc: &str, enabled: bool) -> Result<()> {
        let position = parse_location(loc, self.default_type)?;
        let key = line_breakpoint(position.clone()).key();
        let Some(breakpoint) = self.store.set_enabled(&key, enabled) else {
            println!("No breakpoint at {}", position);
            return Ok(());
        };

        let handler = self.controller.breakpoint_handler();
        let applied = if enabled {
            handler.register_breakpoint(&breakpoint).is_some()
        } else {
            handler.unregister_breakpoint(&breakpoint, true)
        };
        if !applied {
            let state = if enabled { "enabled" } else { "disabled" };
            println!("Breakpoint at {} {} (not applied to the session)", breakpoint.position, state);
        }
        Ok(())
    }

    /// Untilコマンドを処理する
    fn handle_until(&self, loc: &str) -> Result<()> {
        let position = parse_location(loc, self.default_type)?;
        println!("Running to {}...", position);
        self.controller.run_to_position(position)?;
        self.wait_for_stop();
        Ok(())
    }

    /// Backtraceコマンドを処理する
    fn handle_backtrace(&self) {
        match self.controller.backtrace() {
            Some(backtrace) if !backtrace.is_empty() => {
                for (i, frame) in backtrace.frames.iter().enumerate() {
                    println!("#{} {}", i, frame);
                }
            }
            _ => println!("No backtrace available"),
        }
    }

    fn handle_info_breakpoints(&self) {
        let breakpoints = self.store.all();
        if breakpoints.is_empty() {
            println!("No breakpoints");
            return;
        }
        for (i, bp) in breakpoints.iter().enumerate() {
            let state = if bp.enabled { "enabled" } else { "disabled" };
            println!(
                "  {}. {} {} ({})",
                i + 1,
                bp.position.object_type,
                bp.position,
                state
            );
        }
    }

    /// 次の停止位置かセッション終了まで待つ
    fn wait_for_stop(&self) {
        loop {
            match self.events.recv_timeout(POLL_INTERVAL) {
                Ok(event) => {
                    if print_event(event) {
                        return;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if self.controller.is(StatusFlag::Terminated) {
                        self.drain_events();
                        return;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    }

    fn drain_events(&self) {
        for event in self.events.try_iter() {
            print_event(event);
        }
    }

    fn shutdown(&self) {
        self.controller.stop();
        if !self.controller.wait_terminated(SHUTDOWN_TIMEOUT) {
            warn!("debug session did not terminate in time");
        }
        self.drain_events();
        self.controller.join_workers();
        println!("Goodbye!");
    }
}

/// REPLで宣言するブレークポイント（ファイルはプログラム名から決める）
fn line_breakpoint(position: ProgramPosition) -> LineBreakpoint {
    let file = format!("{}.{}.sql", position.schema, position.program).to_ascii_lowercase();
    LineBreakpoint::new(&file, CONNECTION, position)
}

/// イベントを表示する。停止位置の報告なら true
fn print_event(event: HostEvent) -> bool {
    match event {
        HostEvent::Suspended(context) => {
            print_suspended(&context);
            true
        }
        HostEvent::StopRequested => {
            println!("Debug session is stopping");
            false
        }
        HostEvent::Notification(NotificationLevel::Info, message) => {
            println!("{}", message);
            false
        }
        HostEvent::Notification(level, message) => {
            eprintln!("[{}] {}", level, message);
            false
        }
        HostEvent::BreakpointUpdated(breakpoint, status) => {
            print_breakpoint(&breakpoint, &status);
            false
        }
    }
}

fn print_suspended(context: &SuspendContext) {
    let runtime = &context.runtime;
    println!();
    match &context.position {
        Some(position) => println!("Stopped at {} ({})", position, describe_reason(runtime.reason)),
        None => println!("Stopped at {} ({})", runtime, describe_reason(runtime.reason)),
    }
    if let Some(backtrace) = &context.backtrace {
        if backtrace.depth() > 1 {
            println!("  {} frames on the call stack", backtrace.depth());
        }
    }
}

fn print_breakpoint(breakpoint: &LineBreakpoint, status: &BreakpointStatus) {
    match status {
        BreakpointStatus::Verified(id) => {
            println!("Breakpoint {} set at {}", id, breakpoint.position)
        }
        BreakpointStatus::Disabled(id) => {
            println!("Breakpoint {} at {} is disabled", id, breakpoint.position)
        }
        BreakpointStatus::Removed(id) => {
            println!("Deleted breakpoint {} at {}", id, breakpoint.position)
        }
        BreakpointStatus::Invalid(reason) => {
            println!("Breakpoint at {} is invalid: {}", breakpoint.position, reason)
        }
    }
}

fn print_help() {
    println!("Available commands:");
    println!();
    println!("  help              - Show this help message");
    println!("  quit/exit/q       - Stop the session and exit");
    println!();
    println!("Breakpoints:");
    println!("  break <loc>       - Set breakpoint at SCHEMA.PROGRAM:LINE");
    println!("  delete <loc>      - Delete breakpoint");
    println!("  enable <loc>      - Enable breakpoint");
    println!("  disable <loc>     - Disable breakpoint");
    println!("  info breakpoints  - List breakpoints");
    println!();
    println!("Execution:");
    println!("  continue (c)      - Resume until the next breakpoint");
    println!("  next (n)          - Step over the current line");
    println!("  step (s)          - Step into calls");
    println!("  finish (f)        - Run until the current program returns");
    println!("  until <loc>       - Run to a position");
    println!("  pause             - Suspend at the next line");
    println!("  backtrace (bt)    - Show the call stack");
    println!();
    println!("Examples:");
    println!("  break hr.pay_raise:10");
    println!("  break function hr.bonus:3");
    println!("  until hr.pay_raise:12");
}
