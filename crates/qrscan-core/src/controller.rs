//! 扫描覆盖层控制器
//!
//! 两个互相独立的触发源驱动同一个状态值：
//! - 帧结果：重建标记；有码时异步投递一次暂停命令（解绑相机 → Paused）
//! - 指针事件：仅在有标记时拦截；Paused 下先恢复（重新绑定 → Previewing），再扇出给所有标记
//!
//! 状态、代际号与标记集合放在同一把锁里。暂停/恢复在持锁期间调用幂等的相机命令，
//! 锁顺序固定为 控制器 → 相机。恢复会递增代际号，执行线程据此丢弃过期的暂停命令；
//! 执行时标记集合已被空帧清空的暂停同样丢弃。
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::camera::CameraSource;
use crate::executor::{Command, CommandExecutor};
use crate::lifecycle::LifecycleOwner;
use crate::marker::{InteractFn, OverlayMarker};
use crate::options::{ScanStats, ScannerOptions};
use crate::state::ScanState;
use crate::types::{DetectedCode, PointerEvent};

/// 指针事件的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerDispatch {
    /// 已被覆盖层消费，宿主视图不应再做默认处理
    Handled,
    /// 没有标记，交还宿主视图
    PassThrough,
}

#[derive(Debug, Default)]
struct Core {
    state: ScanState,
    generation: u64,
    markers: Vec<OverlayMarker>,
    stats: ScanStats,
}

/// 控制器与执行线程共享的部分
pub(crate) struct Shared {
    camera: Arc<dyn CameraSource>,
    owner: LifecycleOwner,
    core: Mutex<Core>,
}

impl Shared {
    fn core(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 执行线程侧：代际号一致才解绑并转入 Paused
    pub(crate) fn apply_pause(&self, generation: u64) {
        let mut core = self.core();
        if core.generation != generation {
            core.stats.pauses_discarded += 1;
            debug!(generation, current = core.generation, "stale pause discarded");
            return;
        }
        // 排队期间码已离开视野：没有标记可供触摸恢复，不能再暂停
        if core.markers.is_empty() {
            core.stats.pauses_discarded += 1;
            debug!(generation, "no markers left, pause discarded");
            return;
        }
        if let Err(e) = self.camera.unbind() {
            warn!(error = %e, "pause: unbind failed, preview keeps running");
            return;
        }
        core.stats.pauses_applied += 1;
        if core.state.pause() {
            info!(generation, "preview paused");
        }
    }

    /// 持锁恢复：重新绑定成功后才转入 Previewing
    fn resume_locked(&self, core: &mut Core) -> bool {
        match self.camera.bind(&self.owner) {
            Ok(()) => {
                core.generation += 1;
                core.state.resume();
                true
            }
            Err(e) => {
                warn!(error = %e, "resume: bind failed");
                false
            }
        }
    }
}

pub struct ScanOverlayController {
    shared: Arc<Shared>,
    executor: CommandExecutor,
    on_interact: InteractFn,
    options: ScannerOptions,
}

impl ScanOverlayController {
    pub fn new(camera: Arc<dyn CameraSource>, owner: LifecycleOwner, on_interact: InteractFn, options: ScannerOptions) -> Self {
        let shared = Arc::new(Shared { camera, owner, core: Mutex::new(Core::default()) });
        let executor = CommandExecutor::spawn(Arc::clone(&shared), options.command_queue);
        Self { shared, executor, on_interact, options }
    }

    /// 应用一帧的识别结果（帧上下文调用）
    /// - 无条件清空旧标记
    /// - 无码：保持透传，不改状态
    /// - 有码：每个码一个标记（保持检测器顺序），并异步投递一次暂停命令
    pub fn on_frame_result(&self, codes: Vec<DetectedCode>) {
        let mut core = self.shared.core();
        core.markers.clear();
        core.stats.frames_applied += 1;
        if codes.is_empty() {
            return;
        }

        let markers: Vec<OverlayMarker> = codes
            .into_iter()
            .map(|c| OverlayMarker::from_detected_code(c, Arc::clone(&self.on_interact)))
            .collect();
        debug!(count = markers.len(), "markers installed");
        core.stats.markers_built += markers.len();
        core.markers = markers;

        if !self.options.pause_on_detect {
            return;
        }
        let cmd = Command::Pause { generation: core.generation, not_before: Instant::now() + self.options.pause_delay };
        // 投递为非阻塞 try_send，持锁投递也不会卡住帧上下文
        if self.executor.submit(cmd) {
            core.stats.pauses_scheduled += 1;
        } else {
            core.stats.pauses_discarded += 1;
        }
    }

    /// 指针事件拦截（UI 线程调用）
    /// 标记按顺序全部收到事件，不做几何过滤；单个回调失败不影响其余标记。
    pub fn on_pointer_event(&self, event: &PointerEvent) -> PointerDispatch {
        let markers = {
            let mut core = self.shared.core();
            if core.markers.is_empty() {
                return PointerDispatch::PassThrough;
            }
            if core.state.is_paused() && self.shared.resume_locked(&mut core) {
                core.stats.resumes += 1;
                info!(phase = ?event.phase, "preview resumed by pointer");
            }
            // 回调在锁外执行，允许回调里再访问控制器
            core.markers.clone()
        };

        let mut failures = 0;
        for m in markers.iter() {
            if let Err(e) = m.interact(event) {
                failures += 1;
                warn!(payload = m.label(), error = %e, "marker callback failed");
            }
        }
        if failures > 0 {
            self.shared.core().stats.callback_failures += failures;
        }
        PointerDispatch::Handled
    }

    /// 宿主回到前台：重新绑定并回到 Previewing，之前排队的暂停全部作废
    pub fn on_host_resumed(&self) -> bool {
        let mut core = self.shared.core();
        let was_paused = core.state.is_paused();
        let ok = self.shared.resume_locked(&mut core);
        if ok && was_paused {
            info!("preview resumed by host");
        }
        ok
    }

    /// 清空标记并作废排队中的暂停；不触碰相机
    pub fn reset(&self) {
        let mut core = self.shared.core();
        core.markers.clear();
        core.generation += 1;
    }

    /// 当前帧的标记快照（用于绘制）
    pub fn markers(&self) -> Vec<OverlayMarker> { self.shared.core().markers.clone() }

    /// 是否正在拦截指针事件
    pub fn intercepting(&self) -> bool { !self.shared.core().markers.is_empty() }

    pub fn scan_state(&self) -> ScanState { self.shared.core().state }

    pub fn stats(&self) -> ScanStats { self.shared.core().stats.clone() }

    pub fn options(&self) -> &ScannerOptions { &self.options }

    /// 等待已投递的相机命令执行完
    pub fn flush(&self) { self.executor.flush(); }
}

impl std::fmt::Debug for ScanOverlayController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.shared.core();
        f.debug_struct("ScanOverlayController")
            .field("state", &core.state)
            .field("generation", &core.generation)
            .field("markers", &core.markers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraCall, MemoryCamera};
    use crate::marker::noop;
    use crate::types::Point;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn setup(options: ScannerOptions) -> (Arc<MemoryCamera>, ScanOverlayController) {
        let cam = Arc::new(MemoryCamera::new());
        let owner = LifecycleOwner::new("main");
        cam.bind(&owner).unwrap();
        let ctl = ScanOverlayController::new(cam.clone(), owner, noop(), options);
        (cam, ctl)
    }

    fn code(id: u64, payload: &str) -> DetectedCode {
        DetectedCode::from_rect(id, 0.0, 0.0, 10.0, 10.0, payload)
    }

    #[test]
    fn empty_frame_installs_nothing() {
        let (cam, ctl) = setup(ScannerOptions::default());
        ctl.on_frame_result(Vec::new());
        ctl.flush();
        assert!(ctl.markers().is_empty());
        assert_eq!(ctl.stats().pauses_scheduled, 0);
        assert!(cam.is_bound());
        assert_eq!(ctl.on_pointer_event(&PointerEvent::down(1.0, 1.0)), PointerDispatch::PassThrough);
    }

    #[test]
    fn populated_frame_schedules_one_pause() {
        let (cam, ctl) = setup(ScannerOptions::default());
        ctl.on_frame_result(vec![code(1, "a"), code(2, "b"), code(3, "a")]);
        ctl.flush();
        let payloads: Vec<String> = ctl.markers().iter().map(|m| m.label().to_string()).collect();
        assert_eq!(payloads, vec!["a", "b", "a"]);
        let stats = ctl.stats();
        assert_eq!(stats.pauses_scheduled, 1);
        assert_eq!(stats.pauses_applied, 1);
        assert_eq!(ctl.scan_state(), ScanState::Paused);
        assert!(!cam.is_bound());
    }

    #[test]
    fn pause_on_detect_disabled_keeps_previewing() {
        let (cam, ctl) = setup(ScannerOptions { pause_on_detect: false, ..ScannerOptions::default() });
        ctl.on_frame_result(vec![code(1, "a")]);
        ctl.flush();
        assert_eq!(ctl.markers().len(), 1);
        assert_eq!(ctl.scan_state(), ScanState::Previewing);
        assert!(cam.is_bound());
    }

    #[test]
    fn resume_cancels_delayed_pause() {
        let (cam, ctl) = setup(ScannerOptions { pause_delay: Duration::from_millis(50), ..ScannerOptions::default() });
        ctl.on_frame_result(vec![code(1, "a")]);
        assert!(ctl.on_host_resumed());
        ctl.flush();
        let stats = ctl.stats();
        assert_eq!(stats.pauses_discarded, 1);
        assert_eq!(stats.pauses_applied, 0);
        assert!(cam.is_bound());
        assert_eq!(ctl.scan_state(), ScanState::Previewing);
    }

    #[test]
    fn pause_dropped_when_code_leaves_view() {
        let (cam, ctl) = setup(ScannerOptions { pause_delay: Duration::from_millis(50), ..ScannerOptions::default() });
        ctl.on_frame_result(vec![code(1, "a")]);
        ctl.on_frame_result(Vec::new());
        ctl.flush();
        let stats = ctl.stats();
        assert_eq!(stats.pauses_discarded, 1);
        assert_eq!(stats.pauses_applied, 0);
        assert!(cam.is_bound());
        assert_eq!(ctl.scan_state(), ScanState::Previewing);
        assert_eq!(ctl.on_pointer_event(&PointerEvent::down(1.0, 1.0)), PointerDispatch::PassThrough);
    }

    #[test]
    fn failed_unbind_leaves_state_previewing() {
        let (cam, ctl) = setup(ScannerOptions::default());
        cam.fail_next_unbind();
        ctl.on_frame_result(vec![code(1, "a")]);
        ctl.flush();
        assert_eq!(ctl.scan_state(), ScanState::Previewing);
        assert!(cam.is_bound());
    }

    #[test]
    fn failed_rebind_keeps_paused_and_retries_on_next_touch() {
        let (cam, ctl) = setup(ScannerOptions::default());
        ctl.on_frame_result(vec![code(1, "a")]);
        ctl.flush();
        cam.fail_next_bind();
        assert_eq!(ctl.on_pointer_event(&PointerEvent::down(1.0, 1.0)), PointerDispatch::Handled);
        assert_eq!(ctl.scan_state(), ScanState::Paused);
        ctl.on_pointer_event(&PointerEvent::down(1.0, 1.0));
        assert_eq!(ctl.scan_state(), ScanState::Previewing);
        assert!(cam.is_bound());
        assert_eq!(ctl.stats().resumes, 1);
    }

    #[test]
    fn failing_callback_does_not_block_others() {
        let cam = Arc::new(MemoryCamera::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let cb: InteractFn = Arc::new(move |c: &DetectedCode, _: &PointerEvent| -> anyhow::Result<()> {
            if c.payload == "bad" { anyhow::bail!("rejected") }
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let ctl = ScanOverlayController::new(cam, LifecycleOwner::new("main"), cb, ScannerOptions::default());
        ctl.on_frame_result(vec![code(1, "bad"), code(2, "ok"), code(3, "ok")]);
        ctl.on_pointer_event(&PointerEvent::down(50.0, 50.0));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(ctl.stats().callback_failures, 1);
    }

    #[test]
    fn reset_clears_markers_and_cancels_pending_pause() {
        let (cam, ctl) = setup(ScannerOptions { pause_delay: Duration::from_millis(30), ..ScannerOptions::default() });
        ctl.on_frame_result(vec![code(1, "a")]);
        ctl.reset();
        ctl.flush();
        assert!(!ctl.intercepting());
        assert!(cam.is_bound());
        assert!(!cam.calls().iter().any(|c| matches!(c, CameraCall::Unbind { .. })));
    }

    #[test]
    fn late_frame_while_paused_is_tolerated() {
        let (cam, ctl) = setup(ScannerOptions::default());
        ctl.on_frame_result(vec![code(1, "a")]);
        ctl.flush();
        // 解绑已生效后又到了一帧
        ctl.on_frame_result(vec![DetectedCode::new(2, [Point::new(0.0, 0.0); 4], "b")]);
        ctl.flush();
        assert_eq!(ctl.scan_state(), ScanState::Paused);
        assert_eq!(ctl.markers().len(), 1);
        assert!(!cam.is_bound());
        assert_eq!(ctl.stats().pauses_applied, 2);
    }
}
