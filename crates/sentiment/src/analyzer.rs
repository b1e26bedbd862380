//! 新闻标题情感分析

use std::collections::HashMap;

/// 基于词典的标题情感分析器
pub struct HeadlineAnalyzer {
    positive_words: HashMap<String, f64>,
    negative_words: HashMap<String, f64>,
}

impl HeadlineAnalyzer {
    pub fn new() -> Self {
        let mut analyzer = Self {
            positive_words: HashMap::new(),
            negative_words: HashMap::new(),
        };

        analyzer.initialize_dictionaries();
        analyzer
    }

    fn initialize_dictionaries(&mut self) {
        // 正面词汇（股票新闻）
        let positive_words = vec![
            ("up", 1.0),
            ("rise", 1.5),
            ("rises", 1.5),
            ("gain", 1.5),
            ("gains", 1.5),
            ("bullish", 2.0),
            ("positive", 1.0),
            ("strong", 1.0),
            ("beat", 1.5),
            ("beats", 1.5),
            ("surge", 2.0),
            ("surges", 2.0),
            ("rally", 2.0),
            ("record", 1.5),
            ("upgrade", 1.5),
            ("outperform", 1.5),
            ("growth", 1.5),
            ("profit", 1.5),
        ];

        // 负面词汇
        let negative_words = vec![
            ("down", 1.0),
            ("fall", 1.5),
            ("falls", 1.5),
            ("drop", 1.5),
            ("drops", 1.5),
            ("bearish", 2.0),
            ("negative", 1.0),
            ("weak", 1.0),
            ("miss", 1.5),
            ("misses", 1.5),
            ("plunge", 2.5),
            ("crash", 2.5),
            ("downgrade", 1.5),
            ("underperform", 1.5),
            ("loss", 1.5),
            ("lawsuit", 1.5),
            ("fear", 1.5),
        ];

        for (word, weight) in positive_words {
            self.positive_words.insert(word.to_string(), weight);
        }

        for (word, weight) in negative_words {
            self.negative_words.insert(word.to_string(), weight);
        }
    }

    /// 对一组标题打分，返回 [0, 1]
    ///
    /// - 没有标题: `None`
    /// - 有标题但没有命中词典: 0.5
    /// - 否则: `(pos - neg) / (pos + neg)` 从 [-1, 1] 映射到 [0, 1]
    pub fn score_headlines<S: AsRef<str>>(&self, headlines: &[S]) -> Option<f64> {
        if headlines.is_empty() {
            return None;
        }

        let mut positive_score = 0.0;
        let mut negative_score = 0.0;

        for headline in headlines {
            let text = headline.as_ref().to_lowercase();
            for word in text.split_whitespace() {
                let cleaned_word = word.trim_matches(|c: char| !c.is_alphanumeric());

                if let Some(&weight) = self.positive_words.get(cleaned_word) {
                    positive_score += weight;
                }
                if let Some(&weight) = self.negative_words.get(cleaned_word) {
                    negative_score += weight;
                }
            }
        }

        let total = positive_score + negative_score;
        if total == 0.0 {
            return Some(0.5);
        }

        let raw_score = (positive_score - negative_score) / total;
        Some(((raw_score + 1.0) / 2.0).clamp(0.0, 1.0))
    }
}

impl Default for HeadlineAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
