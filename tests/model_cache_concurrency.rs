use churnsurv::config::EngineConfig;
use churnsurv::model::CoxModel;
use churnsurv::{FeatureVector, ModelCache, SubjectId, TrainingSample};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tempfile::NamedTempFile;

fn cohort(slope: f64) -> Vec<TrainingSample> {
    (0..30)
        .map(|i| {
            let x = (i % 10) as f64;
            let time = (40.0 - slope * x + (i % 7) as f64 * 3.0).max(1.0);
            TrainingSample::new(
                FeatureVector::new([x, 1.0, 0.0, 0.0, 0.0, 0.0]),
                time,
                i % 5 != 0,
            )
            .unwrap()
        })
        .collect()
}

fn expected_churn(samples: &[TrainingSample], x: &FeatureVector) -> f64 {
    CoxModel::fit(samples, &EngineConfig::default())
        .unwrap()
        .survival_curve(x)
        .unwrap()
        .churn_probability(EngineConfig::default().neutral_churn_probability)
}

#[test]
fn readers_never_observe_a_mixed_model() {
    let steep = cohort(3.0);
    let flat = cohort(0.5);
    let x = FeatureVector::new([6.0, 1.0, 0.0, 0.0, 0.0, 0.0]);
    let valid = [expected_churn(&steep, &x), expected_churn(&flat, &x)];
    assert_ne!(valid[0], valid[1]);

    let cache = Arc::new(ModelCache::default());
    cache.build_cox_model(&steep).unwrap();
    let done = AtomicBool::new(false);

    thread::scope(|scope| {
        for reader in 0..4 {
            let cache = Arc::clone(&cache);
            let done = &done;
            scope.spawn(move || {
                let mut seen = 0usize;
                while !done.load(Ordering::Acquire) || seen == 0 {
                    let subject = SubjectId::new(format!("reader-{reader}-{}", seen % 3));
                    let p = cache.predict_churn_probability(&subject, Some(&x)).unwrap();
                    assert!(
                        valid.contains(&p),
                        "prediction {p} matches neither fitted model"
                    );
                    seen += 1;
                }
            });
        }

        for round in 0..10 {
            let samples = if round % 2 == 0 { &flat } else { &steep };
            cache.build_cox_model(samples).unwrap();
        }
        done.store(true, Ordering::Release);
    });
}

#[test]
fn persisted_model_predicts_identically() {
    let samples = cohort(2.0);
    let cache = ModelCache::default();
    cache.build_cox_model(&samples).unwrap();

    let file = NamedTempFile::new().unwrap();
    cache.snapshot().unwrap().model().save(file.path()).unwrap();
    let restored = ModelCache::default();
    restored
        .load_model(&std::fs::read(file.path()).unwrap())
        .unwrap();

    let requests: Vec<_> = (0..10)
        .map(|i| {
            (
                SubjectId::new(format!("s{i}")),
                FeatureVector::new([i as f64, 1.0, 0.0, 0.0, 0.0, 0.0]),
            )
        })
        .collect();
    let original = cache.predict_batch(&requests).unwrap();
    let reloaded = restored.predict_batch(&requests).unwrap();
    for (a, b) in original.into_iter().zip(reloaded) {
        let (a, b) = (a.unwrap(), b.unwrap());
        assert!((a.churn_probability - b.churn_probability).abs() < 1e-12);
        assert!((a.expected_time_to_event - b.expected_time_to_event).abs() < 1e-9);
    }
}
