//! 宿主生命周期：观察者注册表 + 相机绑定同步器
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::camera::CameraSource;
use crate::controller::ScanOverlayController;

/// 相机绑定到的宿主身份
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LifecycleOwner {
    name: String,
}

impl LifecycleOwner {
    pub fn new(name: impl Into<String>) -> Self { Self { name: name.into() } }
    pub fn name(&self) -> &str { &self.name }
}

impl fmt::Display for LifecycleOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.name) }
}

/// 生命周期事件，也用作当前阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    Created,
    Resumed,
    Paused,
    Destroyed,
}

pub trait LifecycleObserver: Send + Sync {
    fn on_state_changed(&self, event: LifecycleEvent);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// 生命周期源：维护当前阶段并向观察者分发事件
pub struct Lifecycle {
    phase: Mutex<LifecycleEvent>,
    observers: Mutex<Vec<(ObserverId, Arc<dyn LifecycleObserver>)>>,
    next_id: AtomicU64,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self { phase: Mutex::new(LifecycleEvent::Created), observers: Mutex::new(Vec::new()), next_id: AtomicU64::new(1) }
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("phase", &self.phase())
            .field("observers", &self.observer_count())
            .finish()
    }
}

impl Lifecycle {
    pub fn new() -> Arc<Self> { Arc::new(Self::default()) }

    pub fn phase(&self) -> LifecycleEvent { *self.phase.lock().unwrap_or_else(PoisonError::into_inner) }

    fn observers(&self) -> MutexGuard<'_, Vec<(ObserverId, Arc<dyn LifecycleObserver>)>> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_observer(&self, observer: Arc<dyn LifecycleObserver>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers().push((id, observer));
        id
    }

    /// 移除观察者；已移除时返回 false
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        let mut obs = self.observers();
        let before = obs.len();
        obs.retain(|(oid, _)| *oid != id);
        obs.len() != before
    }

    pub fn observer_count(&self) -> usize { self.observers().len() }

    /// 更新阶段并通知观察者。Destroyed 之后的事件一律忽略。
    /// 分发前先复制观察者列表，观察者可以在回调里注销自己。
    pub fn dispatch(&self, event: LifecycleEvent) {
        {
            let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
            if *phase == LifecycleEvent::Destroyed {
                debug!(?event, "lifecycle already destroyed, event ignored");
                return;
            }
            *phase = event;
        }
        let snapshot: Vec<Arc<dyn LifecycleObserver>> = self.observers().iter().map(|(_, o)| Arc::clone(o)).collect();
        for o in snapshot {
            o.on_state_changed(event);
        }
    }
}

#[derive(Debug)]
struct BinderState {
    phase: LifecycleEvent,
    registration: Option<ObserverId>,
}

/// 把宿主生命周期映射为相机绑定，与扫描状态无关
/// - Resumed：绑定（经由控制器的恢复路径，顺带作废排队中的暂停）
/// - Paused：无条件解绑
/// - Destroyed：从生命周期源注销自己（只做一次）并清空覆盖层
pub struct LifecycleBinder {
    camera: Arc<dyn CameraSource>,
    owner: LifecycleOwner,
    controller: Option<Arc<ScanOverlayController>>,
    lifecycle: Weak<Lifecycle>,
    state: Mutex<BinderState>,
}

impl fmt::Debug for LifecycleBinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleBinder").field("owner", &self.owner).field("state", &*self.state()).finish()
    }
}

impl LifecycleBinder {
    /// 创建并订阅 `lifecycle`
    pub fn register(
        lifecycle: &Arc<Lifecycle>,
        camera: Arc<dyn CameraSource>,
        owner: LifecycleOwner,
        controller: Option<Arc<ScanOverlayController>>,
    ) -> Arc<Self> {
        let binder = Arc::new(Self {
            camera,
            owner,
            controller,
            lifecycle: Arc::downgrade(lifecycle),
            state: Mutex::new(BinderState { phase: LifecycleEvent::Created, registration: None }),
        });
        let id = lifecycle.add_observer(binder.clone());
        binder.state().registration = Some(id);
        binder
    }

    fn state(&self) -> MutexGuard<'_, BinderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> LifecycleEvent { self.state().phase }

    pub fn is_registered(&self) -> bool { self.state().registration.is_some() }

    pub fn on_resumed(&self) {
        self.state().phase = LifecycleEvent::Resumed;
        let bound = match &self.controller {
            Some(ctl) => ctl.on_host_resumed(),
            None => match self.camera.bind(&self.owner) {
                Ok(()) => true,
                Err(e) => { warn!(error = %e, "lifecycle bind failed"); false }
            },
        };
        if bound { info!(owner = %self.owner, "camera bound on resume"); }
    }

    pub fn on_paused(&self) {
        self.state().phase = LifecycleEvent::Paused;
        match self.camera.unbind() {
            Ok(()) => info!(owner = %self.owner, "camera unbound on pause"),
            Err(e) => warn!(error = %e, "lifecycle unbind failed"),
        }
    }

    pub fn on_destroyed(&self) {
        let registration = {
            let mut st = self.state();
            st.phase = LifecycleEvent::Destroyed;
            st.registration.take()
        };
        let Some(id) = registration else { return };
        if let Some(lc) = self.lifecycle.upgrade() {
            lc.remove_observer(id);
        }
        if let Some(ctl) = &self.controller {
            ctl.reset();
        }
        debug!(owner = %self.owner, "lifecycle binder deregistered");
    }
}

impl LifecycleObserver for LifecycleBinder {
    fn on_state_changed(&self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::Resumed => self.on_resumed(),
            LifecycleEvent::Paused => self.on_paused(),
            LifecycleEvent::Destroyed => self.on_destroyed(),
            LifecycleEvent::Created => {}
        }
    }
}
