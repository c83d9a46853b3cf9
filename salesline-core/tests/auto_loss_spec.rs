use speculate2::speculate;

speculate! {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use salesline_core::models::*;
    use salesline_core::{AutoLossDetector, Database, EngineSettings};
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 18, 14, 30, 0).unwrap()
    }

    fn setup() -> (Database, AutoLossDetector) {
        let db = Database::open_memory().expect("Failed to create test database");
        db.migrate().expect("Failed to migrate");
        let detector = AutoLossDetector::new(db.clone(), EngineSettings::default());
        (db, detector)
    }

    fn create_active_since(db: &Database, stage: Stage, since: DateTime<Utc>) -> Pipeline {
        let mut input = CreatePipelineInput::new("Priya Raman", "Tucson Hybrid", Uuid::new_v4());
        input.stage = Some(stage);
        db.create_pipeline(input, since).expect("Failed to create pipeline")
    }

    fn fail_updates_for(db: &Database, id: Uuid) {
        let sql = format!(
            "CREATE TRIGGER fail_pipeline_update BEFORE UPDATE ON pipelines
             WHEN OLD.id = '{id}'
             BEGIN SELECT RAISE(ABORT, 'simulated write failure'); END;"
        );
        db.with_connection(|conn| conn.execute_batch(&sql))
            .expect("Failed to install trigger");
    }

    describe "detect_and_mark_losses" {
        it "marks a pipeline idle for more than the window as lost" {
            let (db, detector) = setup();
            let p2 = create_active_since(&db, Stage::TestDriveScheduled, now() - Duration::days(8));

            let report = detector.detect_and_mark_losses(now()).unwrap();
            assert_eq!(report.marked(), 1);
            assert_eq!(report.marked_ids, vec![p2.id]);

            let stored = db.get_pipeline(p2.id).unwrap().unwrap();
            assert_eq!(stored.current_stage, Stage::Lost);
            assert_eq!(stored.previous_stage, Some(Stage::TestDriveScheduled));
            assert_eq!(stored.probability, 0);
            assert_eq!(stored.auto_logged_events_count, 1);

            let events = db.list_events(p2.id).unwrap();
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].trigger_reason, TriggerReason::AutoLossInactivity);
            assert_eq!(events[0].actor, Actor::System);
            assert_eq!(events[0].occurred_at, now());
        }

        it "marks nothing the second time" {
            let (db, detector) = setup();
            create_active_since(&db, Stage::Lead, now() - Duration::days(30));
            create_active_since(&db, Stage::QuoteSent, now() - Duration::days(9));

            assert_eq!(detector.detect_and_mark_losses(now()).unwrap().marked(), 2);

            let second = detector.detect_and_mark_losses(now()).unwrap();
            assert_eq!(second.marked(), 0);
            assert_eq!(second.scanned, 0);
        }

        it "treats exactly seven days of inactivity as eligible" {
            let (db, detector) = setup();
            let boundary = create_active_since(&db, Stage::Qualified, now() - Duration::days(7));

            let report = detector.detect_and_mark_losses(now()).unwrap();
            assert_eq!(report.marked_ids, vec![boundary.id]);
        }

        it "leaves a pipeline one second short of seven days alone" {
            let (db, detector) = setup();
            let fresh = create_active_since(
                &db,
                Stage::Qualified,
                now() - Duration::days(7) + Duration::seconds(1),
            );

            let report = detector.detect_and_mark_losses(now()).unwrap();
            assert_eq!(report.marked(), 0);
            let stored = db.get_pipeline(fresh.id).unwrap().unwrap();
            assert_eq!(stored.current_stage, Stage::Qualified);
        }

        it "honours a custom inactivity window" {
            let db = Database::open_memory().unwrap();
            db.migrate().unwrap();
            let detector = AutoLossDetector::new(
                db.clone(),
                EngineSettings { inactivity_days: 14, ..EngineSettings::default() },
            );
            create_active_since(&db, Stage::Lead, now() - Duration::days(10));

            assert_eq!(detector.detect_and_mark_losses(now()).unwrap().marked(), 0);
        }

        it "skips terminal pipelines" {
            let (db, detector) = setup();
            let reserved = create_active_since(&db, Stage::ReservationMade, now() - Duration::days(60));
            create_active_since(&db, Stage::Lost, now() - Duration::days(60));

            let report = detector.detect_and_mark_losses(now()).unwrap();
            assert_eq!(report.scanned, 0);
            let stored = db.get_pipeline(reserved.id).unwrap().unwrap();
            assert_eq!(stored.current_stage, Stage::ReservationMade);
        }

        it "counts recent notes as activity" {
            let (db, detector) = setup();
            let pipeline = create_active_since(&db, Stage::QuoteSent, now() - Duration::days(12));
            db.add_note(
                pipeline.id,
                CreateNoteInput { author: "j.silva".into(), content: "Customer asked for trade-in figures".into() },
                now() - Duration::days(2),
            )
            .unwrap();

            assert_eq!(detector.detect_and_mark_losses(now()).unwrap().marked(), 0);
        }

        it "continues past a pipeline that fails to persist" {
            let (db, detector) = setup();
            let broken = create_active_since(&db, Stage::Lead, now() - Duration::days(20));
            let healthy = create_active_since(&db, Stage::Qualified, now() - Duration::days(15));
            fail_updates_for(&db, broken.id);

            let report = detector.detect_and_mark_losses(now()).unwrap();
            assert_eq!(report.scanned, 2);
            assert_eq!(report.marked_ids, vec![healthy.id]);
            assert_eq!(report.failures.len(), 1);
            assert_eq!(report.failures[0].pipeline_id, broken.id);

            let stored = db.get_pipeline(broken.id).unwrap().unwrap();
            assert_eq!(stored.current_stage, Stage::Lead);
            assert!(db.list_events(broken.id).unwrap().is_empty());
        }
    }

    describe "run" {
        it "records the run in history" {
            let (db, detector) = setup();
            create_active_since(&db, Stage::Lead, now() - Duration::days(8));

            detector.run(RunTrigger::Manual, now()).unwrap();
            detector.run(RunTrigger::Scheduled, now()).unwrap();

            let runs = db.list_auto_loss_runs(10).unwrap();
            assert_eq!(runs.len(), 2);
            let manual = runs.iter().find(|r| r.trigger == RunTrigger::Manual).unwrap();
            assert_eq!(manual.marked, 1);
            assert_eq!(manual.as_of, now());
            let scheduled = runs.iter().find(|r| r.trigger == RunTrigger::Scheduled).unwrap();
            assert_eq!(scheduled.marked, 0);
        }

        it "is safe to trigger twice concurrently" {
            let (db, detector) = setup();
            let mut ids = Vec::new();
            for days in 8..20 {
                ids.push(create_active_since(&db, Stage::Lead, now() - Duration::days(days)).id);
            }

            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let detector = detector.clone();
                    std::thread::spawn(move || detector.run(RunTrigger::Manual, now()).unwrap())
                })
                .collect();
            let reports: Vec<AutoLossReport> = handles.into_iter().map(|h| h.join().unwrap()).collect();

            let total: u32 = reports.iter().map(|r| r.marked()).sum();
            assert_eq!(total as usize, ids.len());
            assert!(reports.iter().all(|r| r.failures.is_empty()));

            for id in ids {
                assert_eq!(db.list_events(id).unwrap().len(), 1);
            }
        }

        it "still reports marked pipelines when the history write fails" {
            let (db, detector) = setup();
            let stale = create_active_since(&db, Stage::Qualified, now() - Duration::days(9));
            db.with_connection(|conn| {
                conn.execute_batch(
                    "CREATE TRIGGER fail_run_insert BEFORE INSERT ON auto_loss_runs
                     BEGIN SELECT RAISE(ABORT, 'simulated history failure'); END;",
                )
            })
            .expect("Failed to install trigger");

            let report = detector.run(RunTrigger::Manual, now()).unwrap();

            assert_eq!(report.marked_ids, vec![stale.id]);
            assert!(db.list_auto_loss_runs(10).unwrap().is_empty());
            let stored = db.get_pipeline(stale.id).unwrap().unwrap();
            assert_eq!(stored.current_stage, Stage::Lost);
        }
    }
}
