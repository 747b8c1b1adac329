use serde::{Deserialize, Serialize};
use std::fmt;

/// 流水线阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PipelineStage {
    /// 上传
    Intake = 1,
    /// AI 解析与规范化
    Parsing = 2,
    /// 置信度与人工复核
    Review = 3,
    /// PO–BoL–GRN–Invoice 匹配
    Matching = 4,
    /// 看板（终态）
    Complete = 5,
}

impl PipelineStage {
    pub const FIRST: PipelineStage = PipelineStage::Intake;
    pub const LAST: PipelineStage = PipelineStage::Complete;

    pub const ALL: [PipelineStage; 5] = [
        PipelineStage::Intake,
        PipelineStage::Parsing,
        PipelineStage::Review,
        PipelineStage::Matching,
        PipelineStage::Complete,
    ];

    /// 阶段编号（从 1 开始）
    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(PipelineStage::Intake),
            2 => Some(PipelineStage::Parsing),
            3 => Some(PipelineStage::Review),
            4 => Some(PipelineStage::Matching),
            5 => Some(PipelineStage::Complete),
            _ => None,
        }
    }

    pub fn next(self) -> Option<Self> {
        Self::from_number(self.number() + 1)
    }

    pub fn previous(self) -> Option<Self> {
        self.number().checked_sub(1).and_then(Self::from_number)
    }

    pub fn is_terminal(self) -> bool {
        self == Self::LAST
    }

    pub fn title(self) -> &'static str {
        match self {
            PipelineStage::Intake => "Upload Documents",
            PipelineStage::Parsing => "AI Parsing & Normalization",
            PipelineStage::Review => "Confidence & Human Review",
            PipelineStage::Matching => "PO–BoL–GRN–Invoice Matching",
            PipelineStage::Complete => "Dashboard",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.number(), self.title())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_round_trip_and_bound() {
        for stage in PipelineStage::ALL {
            assert_eq!(PipelineStage::from_number(stage.number()), Some(stage));
        }
        assert_eq!(PipelineStage::from_number(0), None);
        assert_eq!(PipelineStage::from_number(6), None);
    }

    #[test]
    fn navigation_stops_at_ends() {
        assert_eq!(PipelineStage::Intake.previous(), None);
        assert_eq!(PipelineStage::Complete.next(), None);
        assert_eq!(PipelineStage::Review.next(), Some(PipelineStage::Matching));
        assert!(PipelineStage::Complete.is_terminal());
    }
}
