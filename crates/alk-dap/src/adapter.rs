use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use alk_runtime::{
    Breakpoint, DebugEvent, DebugSession, EventReceiver, Navigation, OutputCategory,
    RuntimeConfig, StackFrame,
};
use dap::events::{BreakpointEventBody, StoppedEventBody, TerminatedEventBody};
use dap::prelude::*;
use dap::responses::{
    BreakpointLocationsResponse, ContinueResponse, EvaluateResponse, Response, ScopesResponse,
    SetBreakpointsResponse, SetExceptionBreakpointsResponse, StackTraceResponse, ThreadsResponse,
    VariablesResponse,
};
use tokio::runtime::Handle;
use tracing::{debug, error, info};

use crate::error::AlkAdapterError;
use crate::handler::{DapFrontend, SharedOutput, console_event, send_event};
use crate::protocol::LaunchArgs;

type Result<T> = std::result::Result<T, AlkAdapterError>;

/// The interpreter runs a single thread of execution.
pub const THREAD_ID: i64 = 1;

struct PendingLaunch {
    req: Request,
    program: PathBuf,
    attach: bool,
}

pub fn source_for(path: &Path) -> types::Source {
    types::Source {
        name: path.file_name().map(|n| n.to_string_lossy().to_string()),
        path: Some(path.to_string_lossy().to_string()),
        adapter_data: None,
        source_reference: None,
        presentation_hint: None,
        origin: None,
        checksums: None,
        sources: None,
    }
}

fn to_dap_breakpoint(breakpoint: &Breakpoint, source: Option<types::Source>) -> types::Breakpoint {
    types::Breakpoint {
        id: Some(breakpoint.id as i64),
        verified: breakpoint.is_verified(),
        message: None,
        source,
        line: Some(breakpoint.line as i64),
        column: None,
        end_line: None,
        end_column: None,
        instruction_reference: None,
        offset: None,
    }
}

fn to_dap_frame(frame: &StackFrame, source: Option<types::Source>) -> types::StackFrame {
    types::StackFrame {
        id: frame.index as i64,
        name: frame.name.clone(),
        line: frame.line as i64,
        column: 1,
        source,
        ..Default::default()
    }
}

fn stopped(reason: types::StoppedEventReason, description: &str) -> Event {
    Event::Stopped(StoppedEventBody {
        reason,
        description: Some(description.to_string()),
        thread_id: Some(THREAD_ID),
        preserve_focus_hint: None,
        text: None,
        all_threads_stopped: Some(true),
        hit_breakpoint_ids: None,
    })
}

/// Translates a runtime event into its protocol event.
pub fn to_dap_event(event: DebugEvent) -> Event {
    match event {
        DebugEvent::SessionStarted => stopped(types::StoppedEventReason::Entry, "Paused on entry"),
        DebugEvent::Step => stopped(types::StoppedEventReason::Step, "Step completed"),
        DebugEvent::BreakpointHit => {
            stopped(types::StoppedEventReason::Breakpoint, "Paused on breakpoint")
        }
        DebugEvent::Output { category, mut text } => {
            let category = match category {
                OutputCategory::Stdout => types::OutputEventCategory::Stdout,
                OutputCategory::Stderr => types::OutputEventCategory::Stderr,
                OutputCategory::Console => types::OutputEventCategory::Console,
            };
            if !matches!(category, types::OutputEventCategory::Stderr) && !text.ends_with('\n') {
                text.push('\n');
            }
            console_event(text, category)
        }
        DebugEvent::BreakpointChanged(breakpoint) => Event::Breakpoint(BreakpointEventBody {
            reason: types::BreakpointEventReason::Changed,
            breakpoint: to_dap_breakpoint(&breakpoint, None),
        }),
        DebugEvent::Terminated => Event::Terminated(Some(TerminatedEventBody {
            restart: Some(serde_json::Value::Bool(false)),
        })),
    }
}

pub fn respond<W: Write>(output: &SharedOutput<W>, response: Response) {
    match output.lock() {
        Ok(mut output) => {
            if let Err(e) = output.respond(response) {
                error!(error = %e, "Failed to send response");
            }
        }
        Err(_) => error!("Client output is poisoned"),
    }
}

async fn forward_events<W: Write>(mut events: EventReceiver, output: SharedOutput<W>) {
    while let Some(event) = events.recv().await {
        debug!(?event, "Forwarding event");
        send_event(&output, to_dap_event(event));
    }
}

/// DAP adapter for the Alk interpreter.
///
/// Requests that talk to the interpreter run on `runtime` and answer through the shared
/// output when they finish, so the request loop stays free to deliver prompt answers.
pub struct AlkAdapter<W: Write + Send + 'static> {
    output: SharedOutput<W>,
    runtime: Handle,
    session: Arc<DebugSession>,
    frontend: Arc<DapFrontend<W>>,
    configuration_done: bool,
    pending_launch: Option<PendingLaunch>,
}

impl<W: Write + Send + 'static> AlkAdapter<W> {
    pub fn new(output: SharedOutput<W>, runtime: Handle) -> Self {
        let frontend = Arc::new(DapFrontend::new(output.clone()));
        let (session, events) = DebugSession::new(RuntimeConfig::default(), frontend.clone());
        runtime.spawn(forward_events(events, output.clone()));

        Self {
            output,
            runtime,
            session: Arc::new(session),
            frontend,
            configuration_done: false,
            pending_launch: None,
        }
    }

    pub fn session(&self) -> &Arc<DebugSession> {
        &self.session
    }

    pub fn shutdown(&self) {
        self.frontend.cancel();
        self.session.terminate();
    }

    fn respond(&self, response: Response) {
        respond(&self.output, response);
    }

    /// Runs `op` on the runtime and answers `req` with its outcome.
    fn spawn_request<F, Fut>(&self, req: Request, op: F)
    where
        F: FnOnce(Arc<DebugSession>) -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<ResponseBody, String>> + Send + 'static,
    {
        let output = self.output.clone();
        let session = self.session.clone();
        self.runtime.spawn(async move {
            let response = match op(session).await {
                Ok(body) => req.success(body),
                Err(message) => {
                    error!(%message, "Request failed");
                    req.error(&message)
                }
            };
            respond(&output, response);
        });
    }

    fn defer_launch(
        &mut self,
        req: Request,
        additional_data: Option<serde_json::Value>,
        attach: bool,
    ) -> Result<()> {
        let program = match self.prepare_launch(additional_data) {
            Ok(program) => program,
            Err(e) => {
                self.respond(req.error(&e.to_string()));
                return Err(e);
            }
        };

        self.pending_launch = Some(PendingLaunch {
            req,
            program,
            attach,
        });
        if self.configuration_done {
            self.start_pending_launch();
        }
        Ok(())
    }

    fn prepare_launch(&self, additional_data: Option<serde_json::Value>) -> Result<PathBuf> {
        let additional_data = additional_data.ok_or(AlkAdapterError::MissingLaunchArguments)?;
        let args: LaunchArgs = serde_json::from_value(additional_data)
            .map_err(AlkAdapterError::LaunchArgumentsError)?;
        debug!(?args, "Received launch request");

        let config = args.apply(RuntimeConfig::default().discover(&args.main_file)?);
        self.session.set_config(config);
        Ok(args.main_file)
    }

    fn start_pending_launch(&mut self) {
        let Some(PendingLaunch {
            req,
            program,
            attach,
        }) = self.pending_launch.take()
        else {
            return;
        };

        info!(program = %program.display(), "Launching");
        self.spawn_request(req, move |session| async move {
            session
                .launch(&program)
                .await
                .map_err(|e| e.to_string())?;
            Ok(if attach {
                ResponseBody::Attach
            } else {
                ResponseBody::Launch
            })
        });
    }

    /// Handle DAP request and send appropriate response
    pub fn handle_request(&mut self, req: Request) -> Result<()> {
        match &req.command {
            Command::Launch(args) => {
                let data = args.additional_data.clone();
                self.defer_launch(req, data, false)?;
            }
            Command::Attach(args) => {
                let data = args.additional_data.clone();
                self.defer_launch(req, data, true)?;
            }
            Command::ConfigurationDone => {
                debug!("Received ConfigurationDone request");
                self.configuration_done = true;
                self.respond(req.success(ResponseBody::ConfigurationDone));
                self.start_pending_launch();
            }
            Command::SetExceptionBreakpoints(_) => {
                self.respond(req.success(ResponseBody::SetExceptionBreakpoints(
                    SetExceptionBreakpointsResponse { breakpoints: None },
                )));
            }
            Command::SetBreakpoints(args) => {
                debug!(?args, "Received SetBreakpoints request");
                let source = args.source.clone();
                let lines: Vec<usize> = args
                    .breakpoints
                    .iter()
                    .flatten()
                    .filter_map(|bp| usize::try_from(bp.line).ok())
                    .collect();

                let Some(path) = source.path.clone().map(PathBuf::from) else {
                    self.respond(req.success(ResponseBody::SetBreakpoints(
                        SetBreakpointsResponse {
                            breakpoints: vec![],
                        },
                    )));
                    return Ok(());
                };

                self.spawn_request(req, move |session| async move {
                    let breakpoints = session
                        .replace_breakpoints(&path, &lines)
                        .await
                        .map_err(|e| e.to_string())?;
                    Ok(ResponseBody::SetBreakpoints(SetBreakpointsResponse {
                        breakpoints: breakpoints
                            .iter()
                            .map(|bp| to_dap_breakpoint(bp, Some(source.clone())))
                            .collect(),
                    }))
                });
            }
            Command::BreakpointLocations(args) => {
                let location = types::BreakpointLocation {
                    line: args.line,
                    column: Some(1),
                    end_line: None,
                    end_column: None,
                };
                self.respond(req.success(ResponseBody::BreakpointLocations(
                    BreakpointLocationsResponse {
                        breakpoints: vec![location],
                    },
                )));
            }
            Command::Threads => {
                self.respond(req.success(ResponseBody::Threads(ThreadsResponse {
                    threads: vec![types::Thread {
                        id: THREAD_ID,
                        name: "main".to_string(),
                    }],
                })));
            }
            Command::StackTrace(args) => {
                debug!(?args, "Received StackTrace request");
                let start = args.start_frame.unwrap_or(0).max(0) as usize;
                let levels = args
                    .levels
                    .filter(|levels| *levels > 0)
                    .map_or(usize::MAX, |levels| levels as usize);

                self.spawn_request(req, move |session| async move {
                    let frames = session.stack_trace().await.map_err(|e| e.to_string())?;
                    let source = session.program().as_deref().map(source_for);
                    Ok(ResponseBody::StackTrace(StackTraceResponse {
                        stack_frames: frames
                            .iter()
                            .skip(start)
                            .take(levels)
                            .map(|frame| to_dap_frame(frame, source.clone()))
                            .collect(),
                        total_frames: Some(frames.len() as i64),
                    }))
                });
            }
            Command::Scopes(_) => {
                self.respond(req.success(ResponseBody::Scopes(ScopesResponse {
                    scopes: vec![],
                })));
            }
            Command::Variables(_) => {
                self.respond(req.success(ResponseBody::Variables(VariablesResponse {
                    variables: vec![],
                })));
            }
            Command::Continue(_) => {
                self.spawn_request(req, |session| async move {
                    session.resume().await.map_err(|e| e.to_string())?;
                    Ok(ResponseBody::Continue(ContinueResponse {
                        all_threads_continued: Some(true),
                    }))
                });
            }
            Command::Next(_) => {
                self.spawn_request(req, |session| async move {
                    session.next().await.map_err(|e| e.to_string())?;
                    Ok(ResponseBody::Next)
                });
            }
            Command::StepIn(_) => {
                self.spawn_request(req, |session| async move {
                    session.step_in().await.map_err(|e| e.to_string())?;
                    Ok(ResponseBody::StepIn)
                });
            }
            Command::StepOut(_) => {
                self.spawn_request(req, |session| async move {
                    session.step_out().await.map_err(|e| e.to_string())?;
                    Ok(ResponseBody::StepOut)
                });
            }
            Command::StepBack(_) | Command::ReverseContinue(_) => {
                let reverse_continue = matches!(req.command, Command::ReverseContinue(_));
                self.spawn_request(req, move |session| async move {
                    let navigation = session.step_back().await.map_err(|e| e.to_string())?;
                    if let Navigation::Resumed(checkpoint) = navigation {
                        debug!(ordinal = %checkpoint.ordinal, "Resumed from checkpoint");
                    }
                    Ok(if reverse_continue {
                        ResponseBody::ReverseContinue
                    } else {
                        ResponseBody::StepBack
                    })
                });
            }
            Command::Evaluate(args) => {
                debug!(?args, "Received Evaluate request");

                let from_console = matches!(
                    args.context,
                    None | Some(types::EvaluateArgumentsContext::Repl)
                );

                if self.frontend.is_waiting() && !from_console {
                    // The interpreter is blocked on the choice and cannot print.
                    self.respond(req.success(ResponseBody::Evaluate(evaluate_response(
                        String::new(),
                    ))));
                    return Ok(());
                }

                if let Some(pick) = from_console
                    .then(|| self.frontend.answer(&args.expression))
                    .flatten()
                {
                    let result = match pick {
                        alk_runtime::Pick::Selected(index) => format!("Selected {index}"),
                        alk_runtime::Pick::Dismissed => "Not a valid choice".to_string(),
                        alk_runtime::Pick::Cancelled => "Cancelled".to_string(),
                    };
                    self.respond(req.success(ResponseBody::Evaluate(evaluate_response(result))));
                    return Ok(());
                }

                let expression = args.expression.clone();
                self.spawn_request(req, move |session| async move {
                    let value = session
                        .evaluate(&expression)
                        .await
                        .map_err(|e| e.to_string())?;
                    Ok(ResponseBody::Evaluate(evaluate_response(
                        value.unwrap_or_default(),
                    )))
                });
            }
            Command::Terminate(_) => {
                info!("Received Terminate request");
                self.shutdown();
                self.respond(req.success(ResponseBody::Terminate));
            }
            Command::Disconnect(_) => {
                info!("Received Disconnect request");
                self.shutdown();
                self.respond(req.success(ResponseBody::Disconnect));
                return Err(AlkAdapterError::Shutdown);
            }
            command => {
                let command = Box::new(command.clone());
                self.respond(req.error("Unsupported request"));
                return Err(AlkAdapterError::UnhandledCommand(command));
            }
        }
        Ok(())
    }
}

fn evaluate_response(result: String) -> EvaluateResponse {
    EvaluateResponse {
        result,
        type_field: None,
        variables_reference: 0,
        named_variables: None,
        indexed_variables: None,
        presentation_hint: None,
        memory_reference: None,
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, BufReader, BufWriter, Cursor};
    use std::sync::Mutex;
    use std::time::Duration;

    use alk_runtime::{Pick, PickRequest, Verification};
    use dap::server::Server;
    use rstest::rstest;

    use super::*;
    use alk_runtime::Frontend;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }

        async fn wait_for(&self, needle: &str) {
            let found = tokio::time::timeout(Duration::from_secs(5), async {
                while !self.text().contains(needle) {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
            .await;
            assert!(found.is_ok(), "{needle:?} not in output: {}", self.text());
        }
    }

    fn adapter() -> (AlkAdapter<SharedBuffer>, SharedBuffer) {
        let buffer = SharedBuffer::default();
        let server = Server::new(
            BufReader::new(Cursor::new(Vec::new())),
            BufWriter::new(buffer.clone()),
        );
        (
            AlkAdapter::new(server.output.clone(), Handle::current()),
            buffer,
        )
    }

    fn launch_request(data: serde_json::Value) -> Request {
        Request {
            seq: 1,
            command: Command::Launch(dap::requests::LaunchRequestArguments {
                no_debug: None,
                restart_data: None,
                additional_data: Some(data),
            }),
        }
    }

    #[rstest]
    #[case::stdout(OutputCategory::Stdout, "x = 1", "x = 1\n", "stdout")]
    #[case::console(OutputCategory::Console, "done\n", "done\n", "console")]
    #[case::stderr(OutputCategory::Stderr, "warn", "warn", "stderr")]
    fn test_to_dap_event_output(
        #[case] category: OutputCategory,
        #[case] text: &str,
        #[case] expected: &str,
        #[case] expected_category: &str,
    ) {
        let event = to_dap_event(DebugEvent::Output {
            category,
            text: text.to_string(),
        });
        let Event::Output(body) = event else {
            panic!("expected output event");
        };
        assert_eq!(body.output, expected);
        assert_eq!(
            serde_json::to_value(&body.category).unwrap(),
            serde_json::json!(expected_category)
        );
    }

    #[test]
    fn test_to_dap_event_breakpoint_changed() {
        let event = to_dap_event(DebugEvent::BreakpointChanged(Breakpoint {
            id: 3,
            line: 9,
            verification: Verification::Rejected,
        }));
        let Event::Breakpoint(body) = event else {
            panic!("expected breakpoint event");
        };
        assert_eq!(body.breakpoint.id, Some(3));
        assert!(!body.breakpoint.verified);
    }

    #[test]
    fn test_source_for() {
        let source = source_for(Path::new("/path/to/test.alk"));
        assert_eq!(source.name, Some("test.alk".to_string()));
        assert_eq!(source.path, Some("/path/to/test.alk".to_string()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_handle_request_threads() {
        let (mut adapter, buffer) = adapter();
        let req = Request {
            seq: 1,
            command: Command::Threads,
        };

        assert!(adapter.handle_request(req).is_ok());
        buffer.wait_for("\"main\"").await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_handle_request_scopes() {
        let (mut adapter, _buffer) = adapter();
        let req = Request {
            seq: 1,
            command: Command::Scopes(dap::requests::ScopesArguments { frame_id: 0 }),
        };

        assert!(adapter.handle_request(req).is_ok());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_handle_request_next_without_program_fails() {
        let (mut adapter, buffer) = adapter();
        let req = Request {
            seq: 7,
            command: Command::Next(dap::requests::NextArguments {
                thread_id: THREAD_ID,
                single_thread: None,
                granularity: None,
            }),
        };

        assert!(adapter.handle_request(req).is_ok());
        buffer.wait_for("No interpreter is attached").await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_handle_request_set_breakpoints_before_launch() {
        let (mut adapter, buffer) = adapter();
        let dir = tempfile::tempdir().unwrap();
        let program = dir.path().join("test.alk");
        std::fs::write(&program, "x = 1;\n").unwrap();

        let source = dap::types::Source {
            name: Some("test.alk".to_string()),
            path: Some(program.to_string_lossy().to_string()),
            adapter_data: None,
            source_reference: None,
            presentation_hint: None,
            origin: None,
            checksums: None,
            sources: None,
        };
        let breakpoints = [10, 20]
            .into_iter()
            .map(|line| dap::types::SourceBreakpoint {
                line,
                column: None,
                condition: None,
                hit_condition: None,
                log_message: None,
            })
            .collect();

        #[allow(deprecated)]
        let req = Request {
            seq: 1,
            command: Command::SetBreakpoints(dap::requests::SetBreakpointsArguments {
                source,
                breakpoints: Some(breakpoints),
                lines: None,
                source_modified: None,
            }),
        };

        assert!(adapter.handle_request(req).is_ok());
        buffer.wait_for("\"setBreakpoints\"").await;

        let recorded = adapter.session().breakpoints(&program);
        assert_eq!(
            recorded.iter().map(|bp| bp.line).collect::<Vec<_>>(),
            vec![10, 20]
        );
        assert!(recorded.iter().all(Breakpoint::is_verified));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_handle_request_launch_waits_for_configuration() {
        let (mut adapter, buffer) = adapter();
        let req = launch_request(serde_json::json!({
            "mainFile": "/nonexistent/dir/a.alk",
            "interpreter": "/nonexistent/alki",
        }));

        assert!(adapter.handle_request(req).is_ok());
        assert!(adapter.pending_launch.is_some());
        assert!(!buffer.text().contains("\"launch\""));

        let req = Request {
            seq: 2,
            command: Command::ConfigurationDone,
        };
        assert!(adapter.handle_request(req).is_ok());
        assert!(adapter.pending_launch.is_none());

        buffer.wait_for("Failed to start interpreter").await;
        buffer.wait_for("\"terminated\"").await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_handle_request_launch_missing_arguments() {
        let (mut adapter, buffer) = adapter();
        let req = Request {
            seq: 1,
            command: Command::Launch(dap::requests::LaunchRequestArguments {
                no_debug: None,
                restart_data: None,
                additional_data: None,
            }),
        };

        assert!(matches!(
            adapter.handle_request(req),
            Err(AlkAdapterError::MissingLaunchArguments)
        ));
        buffer.wait_for("Missing launch arguments").await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_evaluate_answers_pending_choice() {
        let (mut adapter, buffer) = adapter();
        let frontend = adapter.frontend.clone();
        let pick = tokio::spawn(async move {
            frontend
                .pick(PickRequest {
                    title: "Choose a value".to_string(),
                    options: vec!["0. a".to_string(), "1. b".to_string()],
                    focus: None,
                })
                .await
        });
        buffer.wait_for("Choose a value").await;

        let req = Request {
            seq: 5,
            command: Command::Evaluate(dap::requests::EvaluateArguments {
                expression: "1".to_string(),
                frame_id: None,
                context: Some(types::EvaluateArgumentsContext::Repl),
                format: None,
            }),
        };
        assert!(adapter.handle_request(req).is_ok());

        assert_eq!(pick.await.unwrap(), Pick::Selected(1));
        buffer.wait_for("Selected 1").await;
    }

    #[rstest]
    #[case::hover(types::EvaluateArgumentsContext::Hover)]
    #[case::watch(types::EvaluateArgumentsContext::Watch)]
    #[case::variables(types::EvaluateArgumentsContext::Variables)]
    #[tokio::test(flavor = "multi_thread")]
    async fn test_evaluate_outside_console_keeps_choice_pending(
        #[case] context: types::EvaluateArgumentsContext,
    ) {
        let (mut adapter, buffer) = adapter();
        let frontend = adapter.frontend.clone();
        let pick = tokio::spawn(async move {
            frontend
                .pick(PickRequest {
                    title: "Choose a value".to_string(),
                    options: vec!["0. a".to_string(), "1. b".to_string()],
                    focus: None,
                })
                .await
        });
        buffer.wait_for("Choose a value").await;

        for seq in 1..=6 {
            let req = Request {
                seq,
                command: Command::Evaluate(dap::requests::EvaluateArguments {
                    expression: "x".to_string(),
                    frame_id: None,
                    context: Some(context.clone()),
                    format: None,
                }),
            };
            assert!(adapter.handle_request(req).is_ok());
        }

        assert!(adapter.frontend.is_waiting());
        assert!(!pick.is_finished());

        assert_eq!(adapter.frontend.answer("0"), Some(Pick::Selected(0)));
        assert_eq!(pick.await.unwrap(), Pick::Selected(0));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_handle_request_disconnect() {
        let (mut adapter, _buffer) = adapter();
        let req = Request {
            seq: 1,
            command: Command::Disconnect(dap::requests::DisconnectArguments {
                restart: None,
                terminate_debuggee: None,
                suspend_debuggee: None,
            }),
        };

        assert!(matches!(
            adapter.handle_request(req),
            Err(AlkAdapterError::Shutdown)
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_handle_request_unhandled_command() {
        let (mut adapter, _buffer) = adapter();
        let req = Request {
            seq: 1,
            command: Command::Initialize(dap::requests::InitializeArguments {
                client_id: None,
                client_name: None,
                adapter_id: "alk".to_string(),
                locale: None,
                lines_start_at1: None,
                columns_start_at1: None,
                path_format: None,
                supports_variable_type: None,
                supports_variable_paging: None,
                supports_run_in_terminal_request: None,
                supports_memory_references: None,
                supports_progress_reporting: None,
                supports_invalidated_event: None,
                supports_memory_event: None,
                supports_args_can_be_interpreted_by_shell: None,
                supports_start_debugging_request: None,
            }),
        };

        assert!(matches!(
            adapter.handle_request(req),
            Err(AlkAdapterError::UnhandledCommand(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread")]
    async fn test_launch_and_step_with_scripted_interpreter() {
        let dir = tempfile::tempdir().unwrap();
        let interpreter = dir.path().join("alki.sh");
        std::fs::write(
            &interpreter,
            "while read -r cmd; do\n  echo \"--- begin <$cmd> ---\"\n  echo \"Current line -> 2.\"\n  echo \"--- end <$cmd> ---\"\ndone\n",
        )
        .unwrap();
        let program = dir.path().join("main.alk");
        std::fs::write(&program, "x = 1;\ny = 2;\n").unwrap();

        let (mut adapter, buffer) = adapter();
        let req = launch_request(serde_json::json!({
            "mainFile": program,
            "interpreter": interpreter,
        }));
        adapter.handle_request(req).unwrap();
        adapter
            .handle_request(Request {
                seq: 2,
                command: Command::ConfigurationDone,
            })
            .unwrap();
        buffer.wait_for("\"entry\"").await;

        adapter
            .handle_request(Request {
                seq: 3,
                command: Command::Next(dap::requests::NextArguments {
                    thread_id: THREAD_ID,
                    single_thread: None,
                    granularity: None,
                }),
            })
            .unwrap();
        buffer.wait_for("\"step\"").await;

        adapter.shutdown();
        buffer.wait_for("\"terminated\"").await;
    }
}
