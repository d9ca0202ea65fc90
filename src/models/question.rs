use serde::{Deserialize, Serialize};
use std::fmt;

/// 选项字母
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OptionLetter {
    A,
    B,
    C,
    D,
}

impl OptionLetter {
    /// 按位置排列的全部字母
    pub const ALL: [OptionLetter; 4] = [
        OptionLetter::A,
        OptionLetter::B,
        OptionLetter::C,
        OptionLetter::D,
    ];

    /// 获取字母对应的选项位置（0-based）
    pub fn index(self) -> usize {
        self as usize
    }

    /// 从位置解析字母
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// 从字符解析字母（不区分大小写）
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'A' => Some(OptionLetter::A),
            'B' => Some(OptionLetter::B),
            'C' => Some(OptionLetter::C),
            'D' => Some(OptionLetter::D),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        (b'A' + self as u8) as char
    }

    /// 循环移动 `shift` 个位置
    pub fn rotate(self, shift: usize) -> Self {
        Self::ALL[(self.index() + shift) % 4]
    }
}

impl fmt::Display for OptionLetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// 难度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

/// 待审核的生成题目
///
/// 选项固定为 4 个，正确答案用字母表示。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateItem {
    /// 题干
    pub prompt_text: String,
    /// 四个选项（A-D）
    pub options: [String; 4],
    /// 正确答案字母
    pub correct_letter: OptionLetter,
    /// 解析
    pub explanation: String,
    pub difficulty: Difficulty,
    /// 生成时使用的依据材料
    pub source_context: String,
}

impl CandidateItem {
    /// 正确选项的文本
    pub fn correct_text(&self) -> &str {
        &self.options[self.correct_letter.index()]
    }

    /// 循环移动选项，正确答案字母随之更新
    ///
    /// 位置 i 的选项移动到 (i + shift) % 4，正确选项的文本保持不变。
    pub fn rotate_options(&mut self, shift: usize) {
        let shift = shift % 4;
        if shift == 0 {
            return;
        }
        self.options.rotate_right(shift);
        self.correct_letter = self.correct_letter.rotate(shift);
    }
}

impl fmt::Display for CandidateItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 截断题干以便显示（最多80个字符）
        let preview = if self.prompt_text.chars().count() > 80 {
            self.prompt_text.chars().take(80).collect::<String>() + "..."
        } else {
            self.prompt_text.clone()
        };
        write!(f, "{} [答案: {}]", preview, self.correct_letter)
    }
}
