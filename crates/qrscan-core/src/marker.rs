//! 覆盖层标记：每个识别结果一个，随帧重建
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::types::{DetectedCode, Point, PointerEvent};

/// 标记交互回调：由调用方提供，可自行做命中测试、跳转、记录内容等
pub type InteractFn = Arc<dyn Fn(&DetectedCode, &PointerEvent) -> Result<()> + Send + Sync>;

/// 单个码在当前帧的可绘制、可交互表示
#[derive(Clone)]
pub struct OverlayMarker {
    code: DetectedCode,
    on_interact: InteractFn,
}

impl fmt::Debug for OverlayMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverlayMarker").field("code", &self.code).finish_non_exhaustive()
    }
}

/// 轴对齐包围盒
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl OverlayMarker {
    /// 纯构造，无副作用
    pub fn from_detected_code(code: DetectedCode, on_interact: InteractFn) -> Self {
        Self { code, on_interact }
    }

    pub fn code(&self) -> &DetectedCode { &self.code }

    /// 供绘制使用的四边形
    pub fn polygon(&self) -> &[Point; 4] { &self.code.corners }

    /// 绘制在框旁边的文字
    pub fn label(&self) -> &str { &self.code.payload }

    pub fn bounds(&self) -> Bounds {
        let mut b = Bounds { left: f32::MAX, top: f32::MAX, right: f32::MIN, bottom: f32::MIN };
        for p in self.code.corners.iter() {
            b.left = b.left.min(p.x);
            b.top = b.top.min(p.y);
            b.right = b.right.max(p.x);
            b.bottom = b.bottom.max(p.y);
        }
        b
    }

    pub fn contains(&self, p: Point) -> bool { polygon_contains(&self.code.corners, p) }

    /// 调用交互回调。回调返回错误或 panic 都只影响本标记，统一转成 Err。
    pub fn interact(&self, event: &PointerEvent) -> Result<()> {
        match catch_unwind(AssertUnwindSafe(|| (self.on_interact)(&self.code, event))) {
            Ok(res) => res,
            Err(panic) => {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                Err(anyhow!("marker callback panicked: {msg}"))
            }
        }
    }
}

/// 包装回调：仅当事件位置落在标记四边形内时才触发
pub fn within_polygon<F>(handler: F) -> InteractFn
where
    F: Fn(&DetectedCode, &PointerEvent) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(move |code: &DetectedCode, event: &PointerEvent| -> Result<()> {
        if polygon_contains(&code.corners, event.position) { handler(code, event) } else { Ok(()) }
    })
}

/// 点是否落在多边形内（射线法）
pub fn polygon_contains(poly: &[Point], p: Point) -> bool {
    if poly.len() < 3 { return false; }
    let mut inside = false;
    let mut j = poly.len() - 1;
    for i in 0..poly.len() {
        let (a, b) = (poly[i], poly[j]);
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
            if p.x < x_cross { inside = !inside; }
        }
        j = i;
    }
    inside
}

/// 不做任何事的回调
pub fn noop() -> InteractFn {
    Arc::new(|_: &DetectedCode, _: &PointerEvent| -> Result<()> { Ok(()) })
}
