//! 扫描状态：相机是否应当在出帧的唯一依据
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    #[default]
    Previewing,
    Paused,
}

impl ScanState {
    /// 转入 Paused；已是 Paused 时返回 false
    pub fn pause(&mut self) -> bool { self.transition(ScanState::Paused) }

    /// 转入 Previewing；已是 Previewing 时返回 false
    pub fn resume(&mut self) -> bool { self.transition(ScanState::Previewing) }

    pub fn is_paused(self) -> bool { self == ScanState::Paused }

    fn transition(&mut self, to: ScanState) -> bool {
        let changed = *self != to;
        *self = to;
        changed
    }
}
