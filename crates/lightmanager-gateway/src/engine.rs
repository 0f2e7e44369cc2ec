//! Command engine.
//!
//! Turns one input line into device operations. A line holds one or more
//! commands separated by `,`, `;` or `&`; they run strictly left to right and
//! a failing command never stops the ones after it. Only `QUIT` and `EXIT`
//! end a line early.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use lightmanager_metrics::{metric_defs, CommandLabels};
use lightmanager_protocol::{
    decode_temperature, parse_fs20_code, parse_time_argument, DeviceCommand, DeviceFrame,
    Fs20Action, Fs20Code, Fs20Command, InterTechnoAction, InterTechnoCommand, InterTechnoMode,
    ProtocolError, SceneCommand, UnirollCommand, TIME_FORMAT_HINT,
};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::clock_sync::ClockSync;
use crate::config::RuntimeConfig;
use crate::error::{CommandError, CommandResult};
use crate::help::write_help;
use crate::output::OutputSink;
use crate::session::ClientSession;
use crate::transport::HardwareTransport;
use crate::{PROGRAM_NAME, VERSION};

/// Characters separating commands within a line.
pub const COMMAND_DELIMITERS: &[char] = &[',', ';', '&'];

/// Characters separating tokens within a command.
pub const TOKEN_DELIMITERS: &[char] = &[' ', '\t', '\x0b', '\x0c', '\r', '\n', ',', ';'];

/// What the connection should do after a line was executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Prompt and read the next line.
    Continue,
    /// Say goodbye and close this connection (`QUIT`).
    Disconnect,
    /// Say goodbye, close and stop the server (`EXIT`).
    Shutdown,
    /// An HTTP request was answered; close without prompt or goodbye.
    HandledAsHttp,
}

/// Control flow after a single command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Next,
    Disconnect,
    Shutdown,
}

/// Split a line into its non-blank commands.
pub fn split_commands(line: &str) -> Vec<&str> {
    line.split(COMMAND_DELIMITERS)
        .filter(|command| !command.trim_matches(TOKEN_DELIMITERS).is_empty())
        .collect()
}

/// Split a command into tokens.
pub fn tokenize(command: &str) -> Vec<&str> {
    command
        .split(TOKEN_DELIMITERS)
        .filter(|token| !token.is_empty())
        .collect()
}

/// Metric family of a tokenized command.
fn family(tokens: &[&str]) -> &'static str {
    let upper = |i: usize| tokens.get(i).map(|t| t.to_ascii_uppercase()).unwrap_or_default();
    match upper(0).as_str() {
        "FS20" => "fs20",
        "UNI" => "uniroll",
        "IT" | "INTERTECHNO" => "intertechno",
        "SCENE" => "scene",
        "GET" | "SET" => match upper(1).as_str() {
            "CLOCK" | "TIME" => "clock",
            "TEMP" | "TEMPERATURE" => "temperature",
            "HOUSECODE" => "housecode",
            _ => "unknown",
        },
        "VERBOSE" | "QUIET" | "QUIT" | "Q" | "EXIT" | "E" => "session",
        "HELP" | "H" | "?" | "VERSION" | "WAIT" => "system",
        _ => "unknown",
    }
}

fn missing(what: &str) -> CommandError {
    CommandError::malformed(format!("missing {} parameter", what))
}

/// Executes command lines against the shared transport and configuration.
pub struct CommandEngine {
    transport: Arc<HardwareTransport>,
    config: Arc<RuntimeConfig>,
    clock: Arc<dyn Clock>,
    clock_sync: ClockSync,
}

impl CommandEngine {
    /// Create an engine.
    pub fn new(
        transport: Arc<HardwareTransport>,
        config: Arc<RuntimeConfig>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let clock_sync = ClockSync::new(transport.clone(), clock.clone());
        CommandEngine {
            transport,
            config,
            clock,
            clock_sync,
        }
    }

    /// The transport commands are sent through.
    pub fn transport(&self) -> &Arc<HardwareTransport> {
        &self.transport
    }

    /// The shared runtime configuration.
    pub fn config(&self) -> &Arc<RuntimeConfig> {
        &self.config
    }

    /// Execute one input line.
    ///
    /// Command errors are reported to the client and do not fail the call;
    /// an `Err` means writing to the client failed.
    pub fn execute(
        &self,
        line: &str,
        session: &mut ClientSession,
        sink: &mut dyn OutputSink,
    ) -> io::Result<Outcome> {
        let commands = split_commands(line);
        let max = self.config.limits().max_commands_per_line;
        if commands.len() > max {
            warn!("{}: rejected line with {} commands", session.peer(), commands.len());
            metrics::counter!(metric_defs::LINES_REJECTED.name, "reason" => "too_many_commands")
                .increment(1);
            session.record_failure();
            sink.write_text(&format!(
                "ERROR - too many commands in one line (at most {})\r\n",
                max
            ))?;
            return Ok(Outcome::Continue);
        }

        for command in commands {
            let text = command.trim_matches(TOKEN_DELIMITERS);
            let tokens = tokenize(text);
            debug!("{}: executing '{}'", session.peer(), text);

            let result = self.dispatch(&tokens, session, sink);
            let labels = CommandLabels::from_outcome(family(&tokens), result.is_ok());
            metrics::counter!(metric_defs::COMMANDS.name, &labels.to_labels()).increment(1);

            match result {
                Ok(Flow::Next) => {
                    if session.reports_status() {
                        sink.write_text(&format!("{}: OK\r\n", text))?;
                    }
                }
                Ok(Flow::Disconnect) => {
                    debug!("{}: quit requested", session.peer());
                    return Ok(Outcome::Disconnect);
                }
                Ok(Flow::Shutdown) => {
                    info!("{}: exit requested", session.peer());
                    return Ok(Outcome::Shutdown);
                }
                Err(CommandError::Io(err)) => return Err(err),
                Err(err) => {
                    warn!("{}: '{}' failed ({}): {}", session.peer(), text, err.kind(), err);
                    session.record_failure();
                    if session.reports_status() {
                        sink.write_text(&format!("{}: ERROR - {}\r\n", text, err))?;
                    }
                }
            }
        }
        Ok(Outcome::Continue)
    }

    fn dispatch(
        &self,
        tokens: &[&str],
        session: &mut ClientSession,
        sink: &mut dyn OutputSink,
    ) -> CommandResult<Flow> {
        let Some(name) = tokens.first() else {
            return Ok(Flow::Next);
        };
        let args = &tokens[1..];
        match name.to_ascii_uppercase().as_str() {
            "HELP" | "H" | "?" => write_help(sink)?,
            "VERSION" => sink.write_text(&format!("{} v{}\r\n", PROGRAM_NAME, VERSION))?,
            "VERBOSE" => session.set_verbose(true),
            "QUIET" => session.set_verbose(false),
            "FS20" => self.fs20(args)?,
            "UNI" => self.uniroll(args)?,
            "IT" | "INTERTECHNO" => self.intertechno(args)?,
            "SCENE" => self.scene(args)?,
            "GET" => self.get(args, sink)?,
            "SET" => self.set(args)?,
            "WAIT" => wait(args)?,
            "QUIT" | "Q" => return Ok(Flow::Disconnect),
            "EXIT" | "E" => return Ok(Flow::Shutdown),
            _ => return Err(CommandError::Unknown(name.to_string())),
        }
        Ok(Flow::Next)
    }

    // ========================================================================
    // Device commands
    // ========================================================================

    fn send(&self, command: DeviceCommand) -> CommandResult<DeviceFrame> {
        let mut frame = command.encode();
        debug!("{} frame [{}]", command.family(), frame);
        self.transport.send(&mut frame, command.expects_reply())?;
        Ok(frame)
    }

    fn fs20(&self, args: &[&str]) -> CommandResult<()> {
        let addr = args.first().ok_or_else(|| missing("<addr>"))?;
        let address = parse_fs20_code(addr)
            .map_err(|_| CommandError::malformed(format!("{}: wrong <addr> parameter", addr)))?;
        let action = Fs20Action::parse(args.get(1).ok_or_else(|| missing("<cmd>"))?)?;
        self.send(DeviceCommand::Fs20(Fs20Command {
            housecode: self.config.housecode(),
            address: Fs20Code(address),
            action,
        }))?;
        Ok(())
    }

    fn uniroll(&self, args: &[&str]) -> CommandResult<()> {
        let addr = args.first().ok_or_else(|| missing("<addr>"))?;
        let cmd = args.get(1).ok_or_else(|| missing("<cmd>"))?;
        self.send(DeviceCommand::Uniroll(UnirollCommand::parse(addr, cmd)?))?;
        Ok(())
    }

    fn intertechno(&self, args: &[&str]) -> CommandResult<()> {
        let code = InterTechnoCommand::parse_code(args.first().ok_or_else(|| missing("<code>"))?)?;
        let channel =
            InterTechnoCommand::parse_channel(args.get(1).ok_or_else(|| missing("<addr>"))?)?;
        let mut rest = &args[2..];
        let mode = rest.first().and_then(|token| InterTechnoMode::parse(token));
        if mode.is_some() {
            rest = &rest[1..];
        }
        let action = InterTechnoAction::parse(rest.first().ok_or_else(|| missing("<cmd>"))?)?;
        self.send(DeviceCommand::InterTechno(InterTechnoCommand::new(
            code, channel, action, mode,
        )?))?;
        Ok(())
    }

    fn scene(&self, args: &[&str]) -> CommandResult<()> {
        let scene = args
            .first()
            .ok_or_else(|| CommandError::malformed("missing parameter"))?;
        let scene = SceneCommand::parse(scene)?;
        self.send(DeviceCommand::Scene(scene))?;
        Ok(())
    }

    // ========================================================================
    // GET / SET
    // ========================================================================

    fn get(&self, args: &[&str], sink: &mut dyn OutputSink) -> CommandResult<()> {
        let what = args
            .first()
            .ok_or_else(|| CommandError::malformed("missing parameter"))?;
        match what.to_ascii_uppercase().as_str() {
            "CLOCK" | "TIME" => {
                let time = self.clock_sync.read()?;
                sink.write_text(&format!("{}\r\n", time.format("%a %b %e %H:%M:%S %Y")))?;
            }
            "TEMP" | "TEMPERATURE" => {
                let reply = self.send(DeviceCommand::GetTemperature)?;
                let temperature = decode_temperature(&reply)?;
                sink.write_text(&temperature.to_string())?;
                if sink.is_html() {
                    sink.write_verbatim(" &deg;C")?;
                }
                sink.write_text("\r\n")?;
            }
            "HOUSECODE" => {
                sink.write_text(&format!("{}\r\n", self.config.housecode()))?;
            }
            _ => {
                return Err(CommandError::malformed(format!(
                    "unknown parameter '{}'",
                    what
                )))
            }
        }
        Ok(())
    }

    fn set(&self, args: &[&str]) -> CommandResult<()> {
        let what = args
            .first()
            .ok_or_else(|| CommandError::malformed("missing parameter"))?;
        match what.to_ascii_uppercase().as_str() {
            "CLOCK" | "TIME" => self.set_clock(args.get(1).copied()),
            "HOUSECODE" => {
                let code = args
                    .get(1)
                    .ok_or_else(|| CommandError::malformed("missing parameter"))?;
                let housecode = parse_fs20_code(code)
                    .map_err(|_| CommandError::malformed(format!("wrong parameter '{}'", code)))?;
                self.config.set_housecode(Fs20Code(housecode));
                info!("housecode set to {}", Fs20Code(housecode).to_string_with_separator('.'));
                Ok(())
            }
            _ => Err(CommandError::malformed(format!(
                "unknown parameter '{}'",
                what
            ))),
        }
    }

    fn set_clock(&self, argument: Option<&str>) -> CommandResult<()> {
        let Some(argument) = argument else {
            return self.clock_sync.write(&self.clock.now());
        };
        if argument.eq_ignore_ascii_case("AUTO") || argument.eq_ignore_ascii_case("AUTOCORRECTION") {
            self.clock_sync.auto_correct()?;
            return Ok(());
        }
        let time = parse_time_argument(argument, &self.clock.now()).map_err(|err| match err {
            ProtocolError::OutOfRange { .. } => CommandError::OutOfRange(err),
            _ => CommandError::malformed(format!(
                "wrong parameter, use time format '{}' or keyword 'AUTO'",
                TIME_FORMAT_HINT
            )),
        })?;
        self.clock_sync.write(&time)
    }
}

fn wait(args: &[&str]) -> CommandResult<()> {
    let ms = args
        .first()
        .ok_or_else(|| CommandError::malformed("missing parameter"))?;
    let ms: u64 = ms
        .parse()
        .map_err(|_| CommandError::malformed(format!("wrong parameter '{}'", ms)))?;
    std::thread::sleep(Duration::from_millis(ms));
    Ok(())
}

impl std::fmt::Debug for CommandEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandEngine")
            .field("transport", &self.transport)
            .field("config", &self.config)
            .finish()
    }
}
