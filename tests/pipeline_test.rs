//! 流水线集成测试：插件 → 总线 → 分发器 → 渠道

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bg_alert::error::DeliveryError;
use bg_alert::model::{Direction, EventType, Reading, Treatment, ONE_MINUTE_MS};
use bg_alert::notification::receipts::ReceiptTable;
use bg_alert::notification::{
    collect_reports, AckOutcome, Delivery, DeliveryChannel, DeliveryOutcome, DeliveryStatus, Level,
    NotificationBus, NotificationDispatcher, NotificationRequest,
};
use bg_alert::plugins::default_registry;
use bg_alert::{AlertPipeline, Config, Sandbox, Thresholds};
use serde_json::json;
use std::collections::HashMap;

const T0: i64 = 1_700_000_000_000;

/// 记录所有投递的渠道；紧急通知返回 receipt
#[derive(Default)]
struct RecordingChannel {
    sends: AtomicUsize,
    sent: Mutex<Vec<NotificationRequest>>,
    receipts: Mutex<ReceiptTable>,
}

impl RecordingChannel {
    fn titles(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|n| n.title.clone()).collect()
    }
}

#[async_trait]
impl DeliveryChannel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    fn should_send(&self, _notification: &NotificationRequest) -> bool {
        true
    }

    async fn send(&self, delivery: &Delivery) -> Result<DeliveryOutcome, DeliveryError> {
        let n = self.sends.fetch_add(1, Ordering::SeqCst) + 1;
        self.sent.lock().unwrap().push(delivery.notification.clone());
        if delivery.level() == Level::Urgent {
            let id = format!("receipt-{}", n);
            self.receipts
                .lock()
                .unwrap()
                .register(id.clone(), delivery.notification.clone());
            return Ok(DeliveryOutcome::Delivered { receipt: Some(id) });
        }
        Ok(DeliveryOutcome::delivered())
    }

    fn acknowledge(&self, receipt: &str) -> Option<NotificationRequest> {
        self.receipts.lock().unwrap().lookup(receipt)
    }
}

fn pipeline_with(channel: Arc<RecordingChannel>) -> AlertPipeline {
    let registry = default_registry(&Config::default()).unwrap();
    let mut dispatcher = NotificationDispatcher::new(Arc::new(NotificationBus::new()));
    dispatcher.register_channel(channel);
    AlertPipeline::new(registry, dispatcher)
}

/// 以 5 分钟间隔结束于 `time` 的读数
fn low_sandbox(time: i64, sgv: f64) -> Sandbox {
    Sandbox::new(time).with_readings(vec![
        Reading::sensor(time - 5 * ONE_MINUTE_MS, sgv + 4.0),
        Reading::sensor(time, sgv).with_direction(Direction::SingleDown),
    ])
}

#[tokio::test]
async fn test_urgent_low_delivered_once_within_cooldown() {
    let channel = Arc::new(RecordingChannel::default());
    let pipeline = pipeline_with(channel.clone());

    for (i, sgv) in [50.0, 48.0, 47.0].into_iter().enumerate() {
        let run = pipeline.run_cycle(low_sandbox(T0 + i as i64 * 5 * ONE_MINUTE_MS, sgv));
        assert_eq!(run.report.delivered.len(), 1);
        let reports = collect_reports(run.deliveries).await;
        let expected = if i == 0 {
            DeliveryStatus::Delivered {
                receipt: Some("receipt-1".to_string()),
            }
        } else {
            DeliveryStatus::Deduplicated
        };
        assert_eq!(reports[0].status, expected);
    }
    assert_eq!(channel.sends.load(Ordering::SeqCst), 1);

    // 冷却期过后再次发送
    let run = pipeline.run_cycle(low_sandbox(T0 + 16 * ONE_MINUTE_MS, 45.0));
    collect_reports(run.deliveries).await;
    assert_eq!(channel.sends.load(Ordering::SeqCst), 2);
    assert_eq!(channel.titles(), vec!["Urgent Low", "Urgent Low"]);
}

#[tokio::test]
async fn test_configured_low_threshold_alarms_once() {
    let channel = Arc::new(RecordingChannel::default());
    let pipeline = pipeline_with(channel.clone());
    let thresholds = Thresholds {
        bg_low: 70.0,
        ..Default::default()
    };
    let sandbox = |time: i64| {
        Sandbox::new(time)
            .with_thresholds(thresholds)
            .with_readings(vec![Reading::sensor(time, 65.0)])
    };

    let run = pipeline.run_cycle(sandbox(T0));
    assert_eq!(run.report.delivered.len(), 1);
    assert_eq!(run.report.delivered[0].level, Level::Urgent);
    assert_eq!(run.report.delivered[0].title, "Urgent Low");
    let reports = collect_reports(run.deliveries).await;
    assert_eq!(
        reports[0].status,
        DeliveryStatus::Delivered {
            receipt: Some("receipt-1".to_string())
        }
    );

    let run = pipeline.run_cycle(sandbox(T0 + 2 * ONE_MINUTE_MS));
    let reports = collect_reports(run.deliveries).await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status, DeliveryStatus::Deduplicated);
    assert_eq!(channel.sends.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_acknowledgement_snoozes_urgent_alarms() {
    let channel = Arc::new(RecordingChannel::default());
    let pipeline = pipeline_with(channel.clone());

    let run = pipeline.run_cycle(low_sandbox(T0, 50.0));
    collect_reports(run.deliveries).await;

    match pipeline.acknowledge_at("receipt-1", T0 + ONE_MINUTE_MS) {
        AckOutcome::Acknowledged {
            level,
            notification,
        } => {
            assert_eq!(level, Level::Urgent);
            assert_eq!(notification.title, "Urgent Low");
        }
        AckOutcome::NotFound => panic!("receipt should be known"),
    }
    assert!(pipeline
        .bus()
        .currently_snoozed_at(Level::Urgent, T0 + 2 * ONE_MINUTE_MS));

    // 冷却期已过，但确认暂停 30 分钟仍然有效
    let run = pipeline.run_cycle(low_sandbox(T0 + 20 * ONE_MINUTE_MS, 45.0));
    assert!(run.report.delivered.is_empty());
    assert_eq!(run.report.suppressed.len(), 1);
    assert!(collect_reports(run.deliveries).await.is_empty());
    assert_eq!(channel.sends.load(Ordering::SeqCst), 1);

    // 暂停结束
    let run = pipeline.run_cycle(low_sandbox(T0 + 32 * ONE_MINUTE_MS, 45.0));
    collect_reports(run.deliveries).await;
    assert_eq!(channel.sends.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_acknowledgement_uses_snapshot_clock() {
    let channel = Arc::new(RecordingChannel::default());
    let pipeline = pipeline_with(channel.clone());

    let run = pipeline.run_cycle(low_sandbox(T0, 50.0));
    collect_reports(run.deliveries).await;
    assert!(matches!(
        pipeline.acknowledge("receipt-1"),
        AckOutcome::Acknowledged { .. }
    ));

    // 暂停从快照时间起算，而不是墙钟
    assert!(pipeline
        .bus()
        .currently_snoozed_at(Level::Urgent, T0 + 29 * ONE_MINUTE_MS));
    assert!(!pipeline
        .bus()
        .currently_snoozed_at(Level::Urgent, T0 + 31 * ONE_MINUTE_MS));
}

#[tokio::test]
async fn test_unknown_receipt_leaves_bus_untouched() {
    let pipeline = pipeline_with(Arc::new(RecordingChannel::default()));
    assert_eq!(pipeline.acknowledge_at("missing", T0), AckOutcome::NotFound);
    assert!(!pipeline.bus().currently_snoozed_at(Level::Info, T0));
}

#[tokio::test]
async fn test_recent_treatment_snoozes_other_alarms() {
    let channel = Arc::new(RecordingChannel::default());
    let pipeline = pipeline_with(channel.clone());

    let sandbox = low_sandbox(T0, 50.0).with_treatments(vec![Treatment::new(
        T0 - 2 * ONE_MINUTE_MS,
        EventType::CarbCorrection,
    )
    .with_carbs(15.0)]);

    let run = pipeline.run_cycle(sandbox);
    assert_eq!(run.report.snoozes.len(), 1);
    assert_eq!(run.report.snoozes[0].level, Level::Urgent);
    assert_eq!(run.report.suppressed.len(), 1);
    assert_eq!(run.report.suppressed[0].notification.title, "Urgent Low");
    // 自己的信息通知不受本周期暂停影响
    assert_eq!(run.report.delivered.len(), 1);
    assert_eq!(run.report.delivered[0].title, "Carb Correction");

    collect_reports(run.deliveries).await;
    assert_eq!(channel.titles(), vec!["Carb Correction"]);
}

#[tokio::test]
async fn test_oversized_snooze_setting_is_capped() {
    let channel = Arc::new(RecordingChannel::default());
    let pipeline = pipeline_with(channel.clone());

    let mut settings = HashMap::new();
    settings.insert("snoozeMins".to_string(), json!(1e300));
    let sandbox = low_sandbox(T0, 50.0)
        .with_treatments(vec![
            Treatment::new(T0 - ONE_MINUTE_MS, EventType::MealBolus).with_insulin(1.0)
        ])
        .with_extended_settings("treatmentnotify", settings);

    let run = pipeline.run_cycle(sandbox);
    assert!(run.report.failures.is_empty());
    assert_eq!(run.report.snoozes.len(), 1);
    assert_eq!(run.report.snoozes[0].until, T0 + 7 * 24 * 60 * ONE_MINUTE_MS);
    assert_eq!(run.report.suppressed[0].notification.title, "Urgent Low");
    collect_reports(run.deliveries).await;

    // 下一个周期仍在暂停中
    let run = pipeline.run_cycle(low_sandbox(T0 + 5 * ONE_MINUTE_MS, 48.0));
    assert!(run.report.delivered.is_empty());
    assert_eq!(run.report.suppressed.len(), 1);
}

#[tokio::test]
async fn test_distinct_info_messages_are_all_delivered() {
    let channel = Arc::new(RecordingChannel::default());
    let pipeline = pipeline_with(channel.clone());

    let first = Sandbox::new(T0).with_readings(vec![Reading::meter(T0 - ONE_MINUTE_MS, 110.0)]);
    let run = pipeline.run_cycle(first);
    collect_reports(run.deliveries).await;

    let second = Sandbox::new(T0 + 2 * ONE_MINUTE_MS)
        .with_readings(vec![Reading::meter(T0 + ONE_MINUTE_MS, 130.0)]);
    let run = pipeline.run_cycle(second.clone());
    collect_reports(run.deliveries).await;

    // 相同内容不再发送
    let run = pipeline.run_cycle(second);
    let reports = collect_reports(run.deliveries).await;
    assert_eq!(reports[0].status, DeliveryStatus::Deduplicated);

    let sent = channel.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].message, "Meter BG: 110 mg/dl");
    assert_eq!(sent[1].message, "Meter BG: 130 mg/dl");
}

#[tokio::test]
async fn test_dry_run_sends_nothing() {
    let channel = Arc::new(RecordingChannel::default());
    let registry = default_registry(&Config::default()).unwrap();
    let mut dispatcher =
        NotificationDispatcher::new(Arc::new(NotificationBus::new())).with_dry_run(true);
    dispatcher.register_channel(channel.clone());
    let pipeline = AlertPipeline::new(registry, dispatcher);

    let run = pipeline.run_cycle(low_sandbox(T0, 50.0));
    let reports = collect_reports(run.deliveries).await;
    assert_eq!(reports[0].status, DeliveryStatus::DryRun);
    assert_eq!(channel.sends.load(Ordering::SeqCst), 0);
}
