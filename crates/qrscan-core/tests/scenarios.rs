use std::sync::{Arc, Mutex};
use std::time::Duration;

use qrscan_core::{
    attach, CameraCall, CameraSource, DetectedCode, Frame, InteractFn, Lifecycle, LifecycleBinder, LifecycleEvent,
    LifecycleOwner, MemoryCamera, PointerDispatch, PointerEvent, ScanOverlayController, ScanState, ScannerOptions,
    ScriptedDetector,
};

struct Rig {
    camera: Arc<MemoryCamera>,
    detector: Arc<ScriptedDetector>,
    controller: Arc<ScanOverlayController>,
    lifecycle: Arc<Lifecycle>,
    calls: Arc<Mutex<Vec<String>>>,
    seq: u64,
}

impl Rig {
    fn new() -> Self { Self::with_options(ScannerOptions::default()) }

    fn with_options(options: ScannerOptions) -> Self {
        let camera = Arc::new(MemoryCamera::new());
        let owner = LifecycleOwner::new("activity");
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        let cb: InteractFn = Arc::new(move |c: &DetectedCode, _: &PointerEvent| -> anyhow::Result<()> {
            sink.lock().unwrap().push(c.payload.clone());
            Ok(())
        });
        let controller = Arc::new(ScanOverlayController::new(camera.clone(), owner.clone(), cb, options));
        let detector = Arc::new(ScriptedDetector::new());
        attach(camera.as_ref(), detector.clone(), &controller);
        let lifecycle = Lifecycle::new();
        LifecycleBinder::register(&lifecycle, camera.clone(), owner, Some(controller.clone()));
        lifecycle.dispatch(LifecycleEvent::Resumed);
        Self { camera, detector, controller, lifecycle, calls, seq: 0 }
    }

    fn frame(&mut self, codes: Vec<DetectedCode>) -> bool {
        self.seq += 1;
        self.detector.push(self.seq, codes);
        self.camera.deliver(Frame::new(self.seq))
    }

    fn take_calls(&self) -> Vec<String> { std::mem::take(&mut *self.calls.lock().unwrap()) }

    fn bind_calls(&self) -> usize {
        self.camera.calls().iter().filter(|c| matches!(c, CameraCall::Bind { .. })).count()
    }
}

fn overlapping_pair() -> Vec<DetectedCode> {
    vec![
        DetectedCode::from_rect(1, 0.0, 0.0, 100.0, 100.0, "A"),
        DetectedCode::from_rect(2, 50.0, 50.0, 150.0, 150.0, "B"),
    ]
}

#[test]
fn overlapping_codes_fan_out_and_resume() {
    let mut rig = Rig::new();
    assert!(rig.frame(overlapping_pair()));
    let labels: Vec<String> = rig.controller.markers().iter().map(|m| m.label().to_string()).collect();
    assert_eq!(labels, vec!["A", "B"]);
    rig.controller.flush();
    assert_eq!(rig.controller.scan_state(), ScanState::Paused);
    assert!(!rig.camera.is_bound());

    // (10,10) 只落在 A 内，但 A、B 都会收到事件
    let binds_before = rig.bind_calls();
    assert_eq!(rig.controller.on_pointer_event(&PointerEvent::down(10.0, 10.0)), PointerDispatch::Handled);
    assert_eq!(rig.take_calls(), vec!["A", "B"]);
    assert_eq!(rig.bind_calls(), binds_before + 1);
    assert_eq!(rig.controller.scan_state(), ScanState::Previewing);
    assert!(rig.camera.is_bound());
}

#[test]
fn resume_on_touch_happens_once() {
    let mut rig = Rig::new();
    rig.frame(overlapping_pair());
    rig.controller.flush();
    rig.controller.on_pointer_event(&PointerEvent::down(10.0, 10.0));
    rig.controller.on_pointer_event(&PointerEvent::moved(11.0, 10.0));
    rig.controller.on_pointer_event(&PointerEvent::up(11.0, 10.0));
    assert_eq!(rig.controller.stats().resumes, 1);
    assert_eq!(rig.take_calls().len(), 6);
}

#[test]
fn empty_frame_after_populated_reverts_to_pass_through() {
    let mut rig = Rig::new();
    assert!(rig.frame(vec![DetectedCode::from_rect(1, 0.0, 0.0, 10.0, 10.0, "A")]));
    assert!(rig.controller.intercepting());
    // 暂停仍在途中时送达的下一帧
    rig.controller.on_frame_result(Vec::new());
    assert!(rig.controller.markers().is_empty());
    assert_eq!(rig.controller.on_pointer_event(&PointerEvent::down(5.0, 5.0)), PointerDispatch::PassThrough);
    assert!(rig.take_calls().is_empty());
}

#[test]
fn each_populated_frame_schedules_exactly_one_pause() {
    let mut rig = Rig::new();
    rig.frame(Vec::new());
    rig.frame(Vec::new());
    assert_eq!(rig.controller.stats().pauses_scheduled, 0);
    rig.frame(overlapping_pair());
    rig.controller.flush();
    let stats = rig.controller.stats();
    assert_eq!(stats.pauses_scheduled, 1);
    assert_eq!(stats.markers_built, 2);
    assert_eq!(stats.frames_applied, 3);
}

#[test]
fn host_pause_unbinds_regardless_of_scan_state_and_resume_rebinds() {
    let mut rig = Rig::new();
    rig.frame(overlapping_pair());
    rig.controller.flush();
    assert_eq!(rig.controller.scan_state(), ScanState::Paused);

    // 排队中的暂停与宿主暂停竞争：重复解绑是空操作
    rig.lifecycle.dispatch(LifecycleEvent::Paused);
    assert!(!rig.camera.is_bound());
    assert!(matches!(rig.camera.calls().last(), Some(CameraCall::Unbind { changed: false })));

    rig.lifecycle.dispatch(LifecycleEvent::Resumed);
    assert!(rig.camera.is_bound());
    assert_eq!(rig.controller.scan_state(), ScanState::Previewing);
    assert!(rig.frame(Vec::new()));
    assert!(!rig.controller.intercepting());
}

#[test]
fn host_pause_while_previewing_still_unbinds() {
    let mut rig = Rig::new();
    assert_eq!(rig.controller.scan_state(), ScanState::Previewing);
    rig.lifecycle.dispatch(LifecycleEvent::Paused);
    assert!(!rig.camera.is_bound());
    assert!(!rig.frame(Vec::new()));
}

#[test]
fn destroy_deregisters_and_clears_overlay() {
    let mut rig = Rig::new();
    rig.frame(overlapping_pair());
    rig.lifecycle.dispatch(LifecycleEvent::Destroyed);
    assert_eq!(rig.lifecycle.observer_count(), 0);
    assert!(rig.controller.markers().is_empty());
    rig.lifecycle.dispatch(LifecycleEvent::Resumed);
    assert_eq!(rig.lifecycle.phase(), LifecycleEvent::Destroyed);
}

#[test]
fn delayed_pause_lands_after_host_pause() {
    let mut rig = Rig::with_options(ScannerOptions { pause_delay: Duration::from_millis(50), ..ScannerOptions::default() });
    assert!(rig.frame(overlapping_pair()));
    // 宿主先进入后台，排队中的暂停随后对已解绑的相机执行
    rig.lifecycle.dispatch(LifecycleEvent::Paused);
    assert!(!rig.camera.is_bound());
    rig.controller.flush();

    assert!(!rig.camera.is_bound());
    assert_eq!(rig.camera.calls().last(), Some(&CameraCall::Unbind { changed: false }));
    let stats = rig.controller.stats();
    assert_eq!(stats.pauses_applied, 1);
    assert_eq!(stats.pauses_discarded, 0);
    assert_eq!(stats.callback_failures, 0);
    assert_eq!(rig.controller.scan_state(), ScanState::Paused);

    // 回到前台后重新绑定并回到 Previewing
    rig.lifecycle.dispatch(LifecycleEvent::Resumed);
    assert!(rig.camera.is_bound());
    assert_eq!(rig.controller.scan_state(), ScanState::Previewing);
}
