//! 会话回放：按脚本驱动帧、指针与生命周期事件，逐步输出 JSON 报告
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

use crate::camera::{CameraSource, MemoryCamera};
use crate::controller::{PointerDispatch, ScanOverlayController};
use crate::detector::{attach, ScriptedDetector};
use crate::lifecycle::{Lifecycle, LifecycleBinder, LifecycleEvent, LifecycleOwner};
use crate::marker::InteractFn;
use crate::options::{ScanStats, ScannerOptions};
use crate::state::ScanState;
use crate::types::{DetectedCode, Frame, Point, PointerEvent, PointerPhase};

/// 脚本中的一个码：给出四个角点或 `[left, top, right, bottom]` 矩形
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptCode {
    pub payload: String,
    #[serde(default)]
    pub corners: Option<[Point; 4]>,
    #[serde(default)]
    pub rect: Option<[f32; 4]>,
}

impl ScriptCode {
    fn to_detected(&self, id: u64) -> Result<DetectedCode> {
        match (&self.corners, &self.rect) {
            (Some(c), None) => Ok(DetectedCode::new(id, *c, self.payload.clone())),
            (None, Some([l, t, r, b])) => Ok(DetectedCode::from_rect(id, *l, *t, *r, *b, self.payload.clone())),
            _ => bail!("code {:?} needs exactly one of `corners` or `rect`", self.payload),
        }
    }
}

fn default_phase() -> PointerPhase { PointerPhase::Down }

/// 脚本步骤
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Step {
    /// 采集一帧，检测器返回 `codes`
    Frame {
        #[serde(default)]
        codes: Vec<ScriptCode>,
    },
    Pointer {
        x: f32,
        y: f32,
        #[serde(default = "default_phase")]
        phase: PointerPhase,
    },
    Lifecycle { event: LifecycleEvent },
    /// 等待排队中的相机命令执行完
    Settle,
}

impl Step {
    fn kind(&self) -> &'static str {
        match self {
            Step::Frame { .. } => "frame",
            Step::Pointer { .. } => "pointer",
            Step::Lifecycle { .. } => "lifecycle",
            Step::Settle => "settle",
        }
    }
}

fn default_true() -> bool { true }

fn default_owner() -> String { "replay".to_string() }

/// 回放脚本
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayScript {
    #[serde(default = "default_owner")]
    pub owner: String,
    /// 开始前先派发一次 Resumed
    #[serde(default = "default_true")]
    pub auto_resume: bool,
    /// 每步结束后等待相机命令执行完，使报告可复现
    #[serde(default = "default_true")]
    pub settle_each_step: bool,
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

impl ReplayScript {
    pub fn from_toml_str(txt: &str) -> Result<Self> {
        toml::from_str(txt).context("parse replay script")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let txt = std::fs::read_to_string(path).with_context(|| format!("read script {}", path.display()))?;
        Self::from_toml_str(&txt)
    }
}

/// 单步报告（对应输出 JSON 数组的一个元素）
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: usize,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatch: Option<&'static str>,
    pub scan_state: ScanState,
    pub bound: bool,
    pub markers: Vec<String>,
    /// 本步触发的标记回调（按调用顺序）
    pub interacted: Vec<String>,
}

/// 回放统计
#[derive(Debug, Default, Clone)]
pub struct ReplayStats {
    pub steps: usize,
    pub frames_delivered: usize,
    pub frames_dropped: usize,
    /// 回放结束时检测器里仍未消费的登记帧数
    pub results_pending: usize,
    pub pointer_handled: usize,
    pub pointer_passed: usize,
    pub controller: ScanStats,
}

/// 执行脚本，并把每步报告以 JSON 数组流式写入 `out`
pub fn replay_and_write(script: &ReplayScript, out: &mut dyn Write, opts: &ScannerOptions) -> Result<ReplayStats> {
    // 先把所有码转换好，脚本有误时不产生任何输出
    let mut frames: Vec<Vec<DetectedCode>> = Vec::new();
    let mut next_id = 1u64;
    for step in &script.steps {
        if let Step::Frame { codes } = step {
            let mut converted = Vec::with_capacity(codes.len());
            for c in codes {
                converted.push(c.to_detected(next_id)?);
                next_id += 1;
            }
            frames.push(converted);
        }
    }

    let owner = LifecycleOwner::new(script.owner.clone());
    let camera = Arc::new(MemoryCamera::new());
    let interactions: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&interactions);
    let on_interact: InteractFn = Arc::new(move |code: &DetectedCode, _: &PointerEvent| -> Result<()> {
        sink.lock().unwrap_or_else(PoisonError::into_inner).push(code.payload.clone());
        Ok(())
    });

    let controller = Arc::new(ScanOverlayController::new(camera.clone(), owner.clone(), on_interact, opts.clone()));
    let detector = Arc::new(ScriptedDetector::new());
    attach(camera.as_ref(), detector.clone(), &controller);
    let lifecycle = Lifecycle::new();
    let _binder = LifecycleBinder::register(&lifecycle, camera.clone(), owner, Some(controller.clone()));
    if script.auto_resume {
        lifecycle.dispatch(LifecycleEvent::Resumed);
    }
    info!(steps = script.steps.len(), "starting replay");

    let mut stats = ReplayStats::default();
    let mut frames = frames.into_iter();
    let mut seq = 0u64;

    write!(out, "[")?;
    for (idx, step) in script.steps.iter().enumerate() {
        let mut delivered = None;
        let mut dispatch = None;
        match step {
            Step::Frame { .. } => {
                seq += 1;
                detector.push(seq, frames.next().unwrap_or_default());
                let ok = camera.deliver(Frame::new(seq));
                if ok {
                    stats.frames_delivered += 1;
                } else {
                    detector.discard(seq);
                    stats.frames_dropped += 1;
                }
                delivered = Some(ok);
            }
            Step::Pointer { x, y, phase } => {
                let event = PointerEvent { position: Point::new(*x, *y), phase: *phase };
                let d = controller.on_pointer_event(&event);
                dispatch = Some(match d {
                    PointerDispatch::Handled => { stats.pointer_handled += 1; "handled" }
                    PointerDispatch::PassThrough => { stats.pointer_passed += 1; "pass_through" }
                });
            }
            Step::Lifecycle { event } => lifecycle.dispatch(*event),
            Step::Settle => controller.flush(),
        }
        if script.settle_each_step { controller.flush(); }

        let report = StepReport {
            step: idx,
            kind: step.kind(),
            delivered,
            dispatch,
            scan_state: controller.scan_state(),
            bound: camera.is_bound(),
            markers: controller.markers().iter().map(|m| m.label().to_string()).collect(),
            interacted: std::mem::take(&mut *interactions.lock().unwrap_or_else(PoisonError::into_inner)),
        };
        debug!(step = idx, kind = report.kind, "step replayed");
        if idx > 0 { write!(out, ",")?; }
        serde_json::to_writer(&mut *out, &report)?;
        stats.steps += 1;
    }
    write!(out, "]")?;

    controller.flush();
    stats.results_pending = detector.pending();
    stats.controller = controller.stats();
    Ok(stats)
}
