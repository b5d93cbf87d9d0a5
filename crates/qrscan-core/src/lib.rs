//! 扫码覆盖层与预览暂停/恢复控制
//!
//! 设计要点：
//! - 标记集合只对应最近一次应用的帧结果，不跨帧保留。
//! - 识别到码后从帧上下文异步投递暂停命令；任意指针事件在 Paused 下触发恢复。
//! - 相机绑定是控制器与生命周期同步器共享的唯一可变资源，两边都直接下发命令，靠 bind/unbind 幂等保持一致。
//! - 相机、检测器、标记回调的失败只记日志，扫描循环不中断。

mod camera;
mod controller;
mod detector;
mod executor;
mod lifecycle;
mod marker;
mod options;
mod replay;
mod state;
mod types;

pub use camera::{CameraCall, CameraError, CameraSource, FrameHandler, MemoryCamera};
pub use controller::{PointerDispatch, ScanOverlayController};
pub use detector::{attach, Detector, ScriptedDetector};
pub use lifecycle::{Lifecycle, LifecycleBinder, LifecycleEvent, LifecycleObserver, LifecycleOwner, ObserverId};
pub use marker::{noop, polygon_contains, within_polygon, Bounds, InteractFn, OverlayMarker};
pub use options::{ScanStats, ScannerOptions};
pub use replay::{replay_and_write, ReplayScript, ReplayStats, ScriptCode, Step, StepReport};
pub use state::ScanState;
pub use types::{CodeFormat, DetectedCode, Frame, Point, PointerEvent, PointerPhase};
