//! 检测器接口与帧回调接线
use anyhow::{bail, Result};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::camera::CameraSource;
use crate::controller::ScanOverlayController;
use crate::types::{DetectedCode, Frame};

/// 条码检测器（黑盒）：输入一帧，输出已映射到视图坐标的码集合
pub trait Detector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Result<Vec<DetectedCode>>;
}

#[derive(Debug, Default)]
struct Script {
    codes: HashMap<u64, Vec<DetectedCode>>,
    failing: HashSet<u64>,
}

/// 按帧序号返回预先登记结果的检测器（回放与测试使用）
#[derive(Debug, Default)]
pub struct ScriptedDetector {
    script: Mutex<Script>,
}

impl ScriptedDetector {
    pub fn new() -> Self { Self::default() }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 登记第 `seq` 帧的识别结果
    pub fn push(&self, seq: u64, codes: Vec<DetectedCode>) { self.script().codes.insert(seq, codes); }

    /// 第 `seq` 帧检测失败
    pub fn fail_on(&self, seq: u64) { self.script().failing.insert(seq); }

    /// 撤销第 `seq` 帧的登记（该帧未投递到检测器时调用）
    pub fn discard(&self, seq: u64) {
        let mut script = self.script();
        script.codes.remove(&seq);
        script.failing.remove(&seq);
    }

    /// 尚未被消费的登记帧数
    pub fn pending(&self) -> usize {
        let script = self.script();
        script.codes.keys().chain(script.failing.iter()).collect::<HashSet<_>>().len()
    }
}

impl Detector for ScriptedDetector {
    fn detect(&self, frame: &Frame) -> Result<Vec<DetectedCode>> {
        let mut script = self.script();
        if script.failing.remove(&frame.seq) {
            bail!("detector failed on frame {}", frame.seq);
        }
        Ok(script.codes.remove(&frame.seq).unwrap_or_default())
    }
}

/// 注册帧回调：帧 → 检测器 → 控制器
///
/// 检测失败按“无码”处理。回调只持有控制器的弱引用，控制器释放后帧被丢弃。
pub fn attach(camera: &dyn CameraSource, detector: Arc<dyn Detector>, controller: &Arc<ScanOverlayController>) {
    let controller = Arc::downgrade(controller);
    camera.set_frame_handler(Box::new(move |frame: Frame| {
        let Some(ctl) = controller.upgrade() else {
            debug!(seq = frame.seq, "controller gone, frame dropped");
            return;
        };
        let codes = match detector.detect(&frame) {
            Ok(codes) => codes,
            Err(e) => {
                warn!(seq = frame.seq, error = %e, "detection failed, treating as empty");
                Vec::new()
            }
        };
        ctl.on_frame_result(codes);
    }));
}
