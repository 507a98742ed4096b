//! `liveview replay`: drives a scripted host session through a real registry.
//!
//! The script is a JSON object with a `steps` array, one host notification per
//! step. After each step every observer's queued work runs to completion and
//! the renders it produced are printed as JSON lines. Proxy blocks that show
//! up in mirrored units are instantiated the way a host would, so nested
//! units are followed too.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use liveview_core::translate::is_proxy_unit_type;
use liveview_core::{
    load_options, plan_mirror, DefaultTranslator, Frame, FrameKind, LiveViewError,
    LiveViewOptions, MemoryHost, ProxyParams, ProxyViewUnit, QueueDispatcher, RenderSink,
    RenderTarget, RootConfig, RootDecision, RootProxyView, SessionRegistry, SessionStatus,
    TreeTranslator, UnitId, UnitSnapshot, UnitType,
};
use liveview_protocol::{ErrorInfo, SessionSummary};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{read_json, write_json_line, CliError, Result};

const ROOT_VIEW: &str = "root";
const APP_VIEW: &str = "app";

#[derive(Debug, Deserialize)]
pub struct ReplayScript {
    /// Overrides `--config` when present.
    #[serde(default)]
    pub options: Option<LiveViewOptions>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    SetUri {
        target: RenderTarget,
        uri: String,
    },
    SetFrames {
        target: RenderTarget,
        unit_id: UnitId,
        #[serde(default)]
        unit_type: Option<UnitType>,
        frames: Vec<Frame>,
    },
    MapUnit {
        target: RenderTarget,
        host_facing_id: UnitId,
        unit_id: UnitId,
    },
    Open {
        session_id: String,
        target: RenderTarget,
    },
    Status {
        session_id: String,
        status: SessionStatus,
    },
    Rerender {
        target: RenderTarget,
        unit_id: UnitId,
    },
    /// The host moved a session to a new location.
    Navigate {
        target: RenderTarget,
        uri: String,
    },
    /// A mirror entry request followed by the observer's connection opening.
    Mirror {
        uri: String,
        session_id: String,
        target: RenderTarget,
        host_facing_unit_id: UnitId,
    },
    List,
}

impl Step {
    fn name(&self) -> &'static str {
        match self {
            Step::SetUri { .. } => "set_uri",
            Step::SetFrames { .. } => "set_frames",
            Step::MapUnit { .. } => "map_unit",
            Step::Open { .. } => "open",
            Step::Status { .. } => "status",
            Step::Rerender { .. } => "rerender",
            Step::Navigate { .. } => "navigate",
            Step::Mirror { .. } => "mirror",
            Step::List => "list",
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum ReplayOutput<'a> {
    Render {
        step: usize,
        session_id: &'a str,
        view: &'a str,
        frames: &'a [Frame],
    },
    MirrorRejected {
        step: usize,
        status: u16,
        error: &'a ErrorInfo,
    },
    Sessions {
        step: usize,
        sessions: &'a [SessionSummary],
    },
}

type Captured = Arc<Mutex<Vec<(String, Vec<Frame>)>>>;

struct CaptureSink {
    view: String,
    captured: Captured,
}

impl RenderSink for CaptureSink {
    fn render(&self, frames: Vec<Frame>) {
        self.captured
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((self.view.clone(), frames));
    }
}

fn capture_sink(view: &str, captured: &Captured) -> Arc<dyn RenderSink> {
    Arc::new(CaptureSink {
        view: view.to_string(),
        captured: Arc::clone(captured),
    })
}

/// Attribute frames of every proxy block in a rendered sequence.
fn proxy_blocks(frames: &[Frame]) -> Vec<&[Frame]> {
    frames
        .iter()
        .enumerate()
        .filter_map(|(index, frame)| match &frame.kind {
            FrameKind::ViewUnit {
                unit_type: Some(unit_type),
                subtree_length,
                ..
            } if is_proxy_unit_type(unit_type) => frames.get(index + 1..index + subtree_length),
            _ => None,
        })
        .collect()
}

struct Observer {
    session_id: String,
    dispatcher: Arc<QueueDispatcher>,
    captured: Captured,
    root: RootProxyView,
    nested: BTreeMap<(String, UnitId), ProxyViewUnit>,
}

impl Observer {
    fn drain(&self) -> Vec<(String, Vec<Frame>)> {
        std::mem::take(
            &mut *self
                .captured
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }

    /// Instantiates proxies for blocks in a mirrored unit's output. Once the
    /// root stops hosting content, every nested proxy is released.
    fn track_nested(
        &mut self,
        view: &str,
        frames: &[Frame],
        registry: &SessionRegistry,
        translator: &Arc<dyn TreeTranslator>,
    ) -> std::result::Result<(), LiveViewError> {
        let blocks = proxy_blocks(frames);
        if view == ROOT_VIEW {
            if blocks.is_empty() && !self.nested.is_empty() {
                debug!(
                    session_id = %self.session_id,
                    released = self.nested.len(),
                    "Releasing nested proxies"
                );
                self.nested.clear();
            }
            return Ok(());
        }

        for attributes in blocks {
            let params = ProxyParams::from_attributes(attributes)?;
            let key = (params.session_id.clone(), params.unit_id);
            if self.nested.contains_key(&key) {
                continue;
            }
            let sink = capture_sink(&format!("unit:{}", params.unit_id), &self.captured);
            let proxy = ProxyViewUnit::attach(
                registry.clone(),
                Arc::clone(translator),
                params,
                sink,
                self.dispatcher.clone(),
            );
            self.nested.insert(key, proxy);
        }
        Ok(())
    }
}

pub struct Replay {
    options: LiveViewOptions,
    host: Arc<MemoryHost>,
    registry: SessionRegistry,
    translator: Arc<dyn TreeTranslator>,
    observers: Vec<Observer>,
}

impl Replay {
    pub fn new(options: LiveViewOptions) -> Self {
        let host = Arc::new(MemoryHost::new());
        let registry = SessionRegistry::with_options(host.clone(), &options);
        Self {
            options,
            host,
            registry,
            translator: Arc::new(DefaultTranslator),
            observers: Vec::new(),
        }
    }

    pub fn apply<W: Write>(&mut self, step: usize, action: Step, out: &mut W) -> Result<()> {
        let op = action.name();
        let failed = |source: LiveViewError| CliError::Replay { step, op, source };

        match action {
            Step::SetUri { target, uri } => self.host.set_uri(target, uri),
            Step::SetFrames {
                target,
                unit_id,
                unit_type,
                frames,
            } => self
                .host
                .set_unit(target, unit_id, UnitSnapshot { unit_type, frames }),
            Step::MapUnit {
                target,
                host_facing_id,
                unit_id,
            } => self.host.map_unit_id(target, host_facing_id, unit_id),
            Step::Open { session_id, target } => {
                self.registry
                    .session_opened(&session_id, target)
                    .map_err(|err| failed(err.into()))?;
            }
            Step::Status { session_id, status } => {
                self.registry
                    .session_status_changed(&session_id, status)
                    .map_err(|err| failed(err.into()))?;
                if status == SessionStatus::Closed {
                    self.observers
                        .retain(|observer| observer.session_id != session_id);
                }
            }
            Step::Rerender { target, unit_id } => {
                self.registry.notify_view_unit_rerendered(target, unit_id)
            }
            Step::Navigate { target, uri } => {
                self.host.set_uri(target, uri);
                self.registry.notify_uri_changed(target);
            }
            Step::Mirror {
                uri,
                session_id,
                target,
                host_facing_unit_id,
            } => {
                let rejected = self
                    .mirror(&uri, &session_id, target, host_facing_unit_id)
                    .map_err(failed)?;
                if let Some(error) = rejected {
                    write_json_line(
                        out,
                        &ReplayOutput::MirrorRejected {
                            step,
                            status: error.http_status(),
                            error: &error,
                        },
                    )?;
                }
            }
            Step::List => {
                let sessions = self.registry.summaries(None);
                write_json_line(
                    out,
                    &ReplayOutput::Sessions {
                        step,
                        sessions: &sessions,
                    },
                )?;
            }
        }

        self.settle(step, out)
    }

    /// Returns the client error when the request is refused.
    fn mirror(
        &mut self,
        uri: &str,
        session_id: &str,
        target: RenderTarget,
        host_facing_unit_id: UnitId,
    ) -> std::result::Result<Option<ErrorInfo>, LiveViewError> {
        let plan = match plan_mirror(&self.registry, &self.options, uri) {
            Ok(plan) => plan,
            Err(error) => {
                warn!(uri = %uri, code = %error.code, "Mirror request rejected");
                return Ok(Some(error));
            }
        };
        plan.stage(&self.registry, session_id)?;
        if let Some(source_uri) = &plan.source_uri {
            self.host.set_uri(target, source_uri.clone());
        }
        if let Err(err) = self.registry.session_opened(session_id, target) {
            // The connection never came up; don't leave its link staged.
            self.registry.cancel_pending_observer(session_id);
            return Err(err.into());
        }

        if matches!(self.registry.root_decision(target), RootDecision::Host) {
            warn!(session_id = %session_id, "Mirror session opened as a regular session");
            return Ok(None);
        }

        let captured = Captured::default();
        let dispatcher = Arc::new(QueueDispatcher::new());
        let root = RootProxyView::install(RootConfig {
            registry: self.registry.clone(),
            translator: Arc::clone(&self.translator),
            observer_session_id: session_id.to_string(),
            host_facing_unit_id,
            use_screen_overlay: self.options.use_screen_overlay,
            sink: capture_sink(ROOT_VIEW, &captured),
            child_sink: capture_sink(APP_VIEW, &captured),
            dispatcher: dispatcher.clone(),
        })?;
        info!(session_id = %session_id, state = ?root.state(), "Observer attached");

        self.observers.push(Observer {
            session_id: session_id.to_string(),
            dispatcher,
            captured,
            root,
            nested: BTreeMap::new(),
        });
        Ok(None)
    }

    /// Runs queued observer work until every observer is idle, printing renders.
    fn settle<W: Write>(&mut self, step: usize, out: &mut W) -> Result<()> {
        for observer in &mut self.observers {
            loop {
                observer.dispatcher.run_pending();
                let renders = observer.drain();
                if renders.is_empty() {
                    break;
                }
                for (view, frames) in renders {
                    write_json_line(
                        out,
                        &ReplayOutput::Render {
                            step,
                            session_id: &observer.session_id,
                            view: &view,
                            frames: &frames,
                        },
                    )?;
                    observer
                        .track_nested(&view, &frames, &self.registry, &self.translator)
                        .map_err(|source| CliError::Replay {
                            step,
                            op: "render",
                            source,
                        })?;
                }
            }
            debug!(
                session_id = %observer.session_id,
                state = ?observer.root.state(),
                nested = observer.nested.len(),
                "Observer settled"
            );
        }
        Ok(())
    }
}

pub fn run(file: &Path, config: Option<PathBuf>) -> Result<()> {
    let script: ReplayScript = read_json(file)?;
    let options = match script.options {
        Some(options) => {
            options.validate().map_err(LiveViewError::from)?;
            options
        }
        None => load_options(config).map_err(LiveViewError::from)?,
    };

    let mut replay = Replay::new(options);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let total = script.steps.len();
    for (index, step) in script.steps.into_iter().enumerate() {
        debug!(step = index, op = step.name(), "Applying replay step");
        replay.apply(index, step, &mut out)?;
    }
    info!(steps = total, observers = replay.observers.len(), "Replay finished");
    Ok(())
}
