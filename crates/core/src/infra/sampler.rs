use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{RngCore, SeedableRng};

use crate::domain::types::RewriteStyle;

/// クイックリライトで提示するスタイル数
pub const QUICK_STYLE_COUNT: usize = 4;

/// リライトスタイルの一様サンプラー（乱数源を差し替え可能）
pub struct StyleSampler {
    rng: Box<dyn RngCore + Send>,
}

impl StyleSampler {
    /// OS エントロピーで初期化
    pub fn random() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// 固定シード（テスト用）
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    pub fn with_rng(rng: impl RngCore + Send + 'static) -> Self {
        Self { rng: Box::new(rng) }
    }

    /// 10 スタイルから重複なしで 4 つを選ぶ
    pub fn sample(&mut self) -> Vec<RewriteStyle> {
        let mut styles = RewriteStyle::ALL;
        let (picked, _) = styles.partial_shuffle(&mut self.rng, QUICK_STYLE_COUNT);
        picked.to_vec()
    }
}

impl Default for StyleSampler {
    fn default() -> Self {
        Self::random()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_sample_is_four_distinct_styles() {
        let mut sampler = StyleSampler::random();
        for _ in 0..50 {
            let styles = sampler.sample();
            assert_eq!(styles.len(), QUICK_STYLE_COUNT);
            let unique: HashSet<_> = styles.iter().collect();
            assert_eq!(unique.len(), QUICK_STYLE_COUNT);
        }
    }

    #[test]
    fn test_seeded_sampler_is_deterministic() {
        let mut a = StyleSampler::seeded(42);
        let mut b = StyleSampler::seeded(42);
        for _ in 0..5 {
            assert_eq!(a.sample(), b.sample());
        }
    }

    #[test]
    fn test_every_style_can_be_offered() {
        let mut sampler = StyleSampler::seeded(7);
        let mut seen = HashSet::new();
        for _ in 0..200 {
            seen.extend(sampler.sample());
        }
        assert_eq!(seen.len(), RewriteStyle::ALL.len());
    }
}
