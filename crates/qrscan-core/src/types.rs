//! 公共数据类型（帧、识别结果、指针事件）
use serde::Deserialize;

/// 视图坐标系中的二维点
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self { Self { x, y } }
}

/// 码制。只识别 QR 码，其余格式由检测器在上游过滤。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CodeFormat {
    #[default]
    QrCode,
}

/// 单帧中识别到的一个码
/// - `corners`：四个角点，已映射到预览视图坐标，顺时针
/// - 每帧由检测器重新产出，产出后不可变
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedCode {
    pub id: u64,
    pub corners: [Point; 4],
    pub payload: String,
    pub format: CodeFormat,
}

impl DetectedCode {
    pub fn new(id: u64, corners: [Point; 4], payload: impl Into<String>) -> Self {
        Self { id, corners, payload: payload.into(), format: CodeFormat::QrCode }
    }

    /// 由轴对齐矩形构造（左上角起顺时针）
    pub fn from_rect(id: u64, left: f32, top: f32, right: f32, bottom: f32, payload: impl Into<String>) -> Self {
        let corners = [
            Point::new(left, top),
            Point::new(right, top),
            Point::new(right, bottom),
            Point::new(left, bottom),
        ];
        Self::new(id, corners, payload)
    }
}

/// 指针事件阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerPhase {
    Down,
    Move,
    Up,
}

/// 指针事件（控制器只负责分发，不解释内容）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub position: Point,
    pub phase: PointerPhase,
}

impl PointerEvent {
    pub fn down(x: f32, y: f32) -> Self { Self { position: Point::new(x, y), phase: PointerPhase::Down } }
    pub fn moved(x: f32, y: f32) -> Self { Self { position: Point::new(x, y), phase: PointerPhase::Move } }
    pub fn up(x: f32, y: f32) -> Self { Self { position: Point::new(x, y), phase: PointerPhase::Up } }
}

/// 相机源送出的一帧。像素内容只有检测器关心，这里只保留采集序号。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// 采集序号，按采集顺序递增
    pub seq: u64,
}

impl Frame {
    pub fn new(seq: u64) -> Self { Self { seq } }
}
