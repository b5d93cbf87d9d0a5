//! 相机源接口与进程内实现
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::debug;

use crate::lifecycle::LifecycleOwner;
use crate::types::Frame;

/// 帧回调：注册一次，按采集顺序被反复调用，同一时刻至多一帧在处理
pub type FrameHandler = Box<dyn FnMut(Frame) + Send>;

/// 相机绑定/解绑失败
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("bind to {owner} failed: {reason}")]
    BindFailed { owner: String, reason: String },
    #[error("unbind failed: {reason}")]
    UnbindFailed { reason: String },
}

/// 相机源
///
/// `bind`/`unbind` 必须幂等：目标状态已达成时为空操作，不返回错误。
/// 实现方不得在 `bind`/`unbind` 内同步回调控制器。
pub trait CameraSource: Send + Sync {
    fn bind(&self, owner: &LifecycleOwner) -> Result<(), CameraError>;
    fn unbind(&self) -> Result<(), CameraError>;
    fn is_bound(&self) -> bool;
    fn set_frame_handler(&self, handler: FrameHandler);
}

/// 记录下来的一次相机调用
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraCall {
    /// `changed`：这次调用是否真的改变了绑定状态
    Bind { owner: String, changed: bool },
    Unbind { changed: bool },
}

#[derive(Debug, Default)]
struct CameraState {
    owner: Option<LifecycleOwner>,
    calls: Vec<CameraCall>,
    fail_next_bind: bool,
    fail_next_unbind: bool,
}

/// 进程内相机源：记录所有调用，只在绑定期间投递帧，可注入失败
#[derive(Default)]
pub struct MemoryCamera {
    state: Mutex<CameraState>,
    handler: Mutex<Option<FrameHandler>>,
}

impl MemoryCamera {
    pub fn new() -> Self { Self::default() }

    fn state(&self) -> MutexGuard<'_, CameraState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 向已注册的帧回调投递一帧；未绑定或未注册回调时丢弃并返回 false
    pub fn deliver(&self, frame: Frame) -> bool {
        if !self.is_bound() {
            debug!(seq = frame.seq, "camera unbound, frame dropped");
            return false;
        }
        // 持有 handler 锁期间调用回调，保证帧串行投递
        let mut handler = self.handler.lock().unwrap_or_else(PoisonError::into_inner);
        match handler.as_mut() {
            Some(h) => { h(frame); true }
            None => false,
        }
    }

    pub fn calls(&self) -> Vec<CameraCall> { self.state().calls.clone() }

    pub fn owner(&self) -> Option<LifecycleOwner> { self.state().owner.clone() }

    pub fn fail_next_bind(&self) { self.state().fail_next_bind = true; }

    pub fn fail_next_unbind(&self) { self.state().fail_next_unbind = true; }
}

impl CameraSource for MemoryCamera {
    fn bind(&self, owner: &LifecycleOwner) -> Result<(), CameraError> {
        let mut st = self.state();
        if std::mem::take(&mut st.fail_next_bind) {
            return Err(CameraError::BindFailed { owner: owner.name().to_string(), reason: "injected failure".into() });
        }
        let changed = st.owner.as_ref() != Some(owner);
        st.owner = Some(owner.clone());
        st.calls.push(CameraCall::Bind { owner: owner.name().to_string(), changed });
        Ok(())
    }

    fn unbind(&self) -> Result<(), CameraError> {
        let mut st = self.state();
        if std::mem::take(&mut st.fail_next_unbind) {
            return Err(CameraError::UnbindFailed { reason: "injected failure".into() });
        }
        let changed = st.owner.take().is_some();
        st.calls.push(CameraCall::Unbind { changed });
        Ok(())
    }

    fn is_bound(&self) -> bool { self.state().owner.is_some() }

    fn set_frame_handler(&self, handler: FrameHandler) {
        *self.handler.lock().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }
}
