use speculate2::speculate;

speculate! {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rust_decimal::Decimal;
    use salesline_core::models::*;
    use salesline_core::{CoreError, Database, EngineSettings, StageEngine};
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    fn setup() -> (Database, StageEngine) {
        let db = Database::open_memory().expect("Failed to create test database");
        db.migrate().expect("Failed to migrate");
        let engine = StageEngine::new(db.clone(), EngineSettings::default());
        (db, engine)
    }

    fn create_in_stage(db: &Database, stage: Stage) -> Pipeline {
        let mut input = CreatePipelineInput::new("Dana Whitfield", "2025 Corolla Cross", Uuid::new_v4());
        input.stage = Some(stage);
        db.create_pipeline(input, now() - Duration::days(1))
            .expect("Failed to create pipeline")
    }

    describe "score_updated" {
        it "leaves a lead below the threshold untouched" {
            let (db, engine) = setup();
            let pipeline = create_in_stage(&db, Stage::Lead);

            for score in [0, 42, 69] {
                let outcome = engine
                    .apply_signal(pipeline.id, &Signal::ScoreUpdated { score }, now())
                    .unwrap();
                assert!(!outcome.transitioned);
                assert!(outcome.event.is_none());
                assert_eq!(outcome.pipeline.current_stage, Stage::Lead);
            }

            let stored = db.get_pipeline(pipeline.id).unwrap().unwrap();
            assert_eq!(stored, pipeline);
            assert!(db.list_events(pipeline.id).unwrap().is_empty());
        }

        it "qualifies a lead at or above the threshold exactly once" {
            let (db, engine) = setup();
            let pipeline = create_in_stage(&db, Stage::Lead);

            let outcome = engine
                .apply_signal(pipeline.id, &Signal::ScoreUpdated { score: 70 }, now())
                .unwrap();
            assert!(outcome.transitioned);
            assert_eq!(outcome.pipeline.current_stage, Stage::Qualified);
            assert_eq!(outcome.pipeline.previous_stage, Some(Stage::Lead));
            assert_eq!(outcome.pipeline.stage_entered_at, now());
            assert_eq!(outcome.pipeline.probability, Stage::Qualified.default_probability());
            assert_eq!(outcome.pipeline.auto_logged_events_count, 1);

            let again = engine
                .apply_signal(pipeline.id, &Signal::ScoreUpdated { score: 95 }, now())
                .unwrap();
            assert!(!again.transitioned);

            let events = db.list_events(pipeline.id).unwrap();
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].from_stage, Stage::Lead);
            assert_eq!(events[0].to_stage, Stage::Qualified);
            assert_eq!(events[0].trigger_reason, TriggerReason::ScoreThreshold);
            assert_eq!(events[0].actor, Actor::System);
        }

        it "rejects scores above 100" {
            let (db, engine) = setup();
            let pipeline = create_in_stage(&db, Stage::Lead);

            let result = engine.apply_signal(pipeline.id, &Signal::ScoreUpdated { score: 101 }, now());
            assert!(matches!(result, Err(CoreError::InvalidInput(_))));
        }
    }

    describe "quote_generated" {
        it "moves a qualified pipeline to quote_sent" {
            let (db, engine) = setup();
            let p1 = create_in_stage(&db, Stage::Qualified);
            let amount: Decimal = "31450.00".parse().unwrap();

            let outcome = engine
                .apply_signal(p1.id, &Signal::QuoteGenerated { amount: Some(amount) }, now())
                .unwrap();

            assert_eq!(outcome.pipeline.current_stage, Stage::QuoteSent);
            assert_eq!(outcome.pipeline.previous_stage, Some(Stage::Qualified));
            assert_eq!(outcome.pipeline.quote_amount, Some(amount));

            let events = db.list_events(p1.id).unwrap();
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].trigger_reason, TriggerReason::QuoteGenerated);
        }

        it "records a revised quote without changing stage" {
            let (db, engine) = setup();
            let pipeline = create_in_stage(&db, Stage::QuoteSent);
            let amount: Decimal = "29990.50".parse().unwrap();

            let outcome = engine
                .apply_signal(pipeline.id, &Signal::QuoteGenerated { amount: Some(amount) }, now())
                .unwrap();

            assert!(!outcome.transitioned);
            assert_eq!(outcome.pipeline.current_stage, Stage::QuoteSent);
            assert_eq!(outcome.pipeline.quote_amount, Some(amount));
            assert_eq!(outcome.pipeline.last_activity_at, now());
            assert!(db.list_events(pipeline.id).unwrap().is_empty());
        }
    }

    describe "reservation_created" {
        it "closes a pipeline after a completed test drive" {
            let (db, engine) = setup();
            let pipeline = create_in_stage(&db, Stage::TestDriveCompleted);

            let outcome = engine
                .apply_signal(pipeline.id, &Signal::ReservationCreated, now())
                .unwrap();

            assert_eq!(outcome.pipeline.current_stage, Stage::ReservationMade);
            assert_eq!(outcome.pipeline.probability, 100);
            assert_eq!(outcome.event.unwrap().trigger_reason, TriggerReason::ReservationCreated);
        }

        it "is ignored before a test drive is scheduled" {
            let (db, engine) = setup();
            let pipeline = create_in_stage(&db, Stage::QuoteSent);

            let outcome = engine
                .apply_signal(pipeline.id, &Signal::ReservationCreated, now())
                .unwrap();
            assert!(!outcome.transitioned);
            assert_eq!(outcome.pipeline.current_stage, Stage::QuoteSent);
        }
    }

    describe "terminal stages" {
        it "ignore every signal" {
            let (db, engine) = setup();
            let signals = [
                Signal::ScoreUpdated { score: 100 },
                Signal::QuoteGenerated { amount: Some(Decimal::new(1_000_000, 2)) },
                Signal::ReservationCreated,
            ];

            for stage in [Stage::Lost, Stage::ReservationMade] {
                let pipeline = create_in_stage(&db, stage);
                for signal in &signals {
                    let outcome = engine.apply_signal(pipeline.id, signal, now()).unwrap();
                    assert!(!outcome.transitioned);
                }
                let stored = db.get_pipeline(pipeline.id).unwrap().unwrap();
                assert_eq!(stored, pipeline);
                assert!(db.list_events(pipeline.id).unwrap().is_empty());
            }
        }
    }

    describe "move_stage" {
        it "logs a manual event with the user as actor" {
            let (db, engine) = setup();
            let pipeline = create_in_stage(&db, Stage::QuoteSent);

            let outcome = engine
                .move_stage(
                    pipeline.id,
                    MoveStageInput {
                        to_stage: Stage::TestDriveScheduled,
                        actor: "m.okafor".into(),
                        expected_revision: Some(pipeline.revision),
                    },
                    now(),
                )
                .unwrap();

            assert_eq!(outcome.pipeline.current_stage, Stage::TestDriveScheduled);
            let event = outcome.event.unwrap();
            assert_eq!(event.trigger_reason, TriggerReason::Manual);
            assert_eq!(event.actor, Actor::User("m.okafor".into()));
        }

        it "zeroes probability when marking lost" {
            let (db, engine) = setup();
            let pipeline = create_in_stage(&db, Stage::TestDriveCompleted);

            let outcome = engine
                .move_stage(
                    pipeline.id,
                    MoveStageInput { to_stage: Stage::Lost, actor: "m.okafor".into(), expected_revision: None },
                    now(),
                )
                .unwrap();
            assert_eq!(outcome.pipeline.probability, 0);
        }

        it "returns a conflict for a stale revision" {
            let (db, engine) = setup();
            let pipeline = create_in_stage(&db, Stage::Lead);
            engine
                .apply_signal(pipeline.id, &Signal::ScoreUpdated { score: 90 }, now())
                .unwrap();

            let result = engine.move_stage(
                pipeline.id,
                MoveStageInput { to_stage: Stage::Lost, actor: "m.okafor".into(), expected_revision: Some(pipeline.revision) },
                now(),
            );
            let err = result.unwrap_err();
            assert!(matches!(err, CoreError::Conflict { .. }));
            assert!(err.is_retryable());
        }
    }

    describe "concurrent writers" {
        it "reject a transition computed from a stale read" {
            let (db, engine) = setup();
            let pipeline = create_in_stage(&db, Stage::Qualified);

            let transition = salesline_core::engine::evaluate(
                &pipeline,
                &Signal::QuoteGenerated { amount: None },
                engine.settings(),
                now(),
            )
            .expect("rule should match");

            db.update_pipeline(
                pipeline.id,
                UpdatePipelineInput { next_action: Some("Call back".into()), ..Default::default() },
                now(),
            )
            .unwrap();

            let result = db.commit_transition(&transition, pipeline.revision);
            assert!(matches!(result, Err(CoreError::Conflict { .. })));
            assert!(db.list_events(pipeline.id).unwrap().is_empty());
        }

        it "keep the event counter in step with the event log" {
            let (db, engine) = setup();
            let pipeline = create_in_stage(&db, Stage::Lead);

            engine.apply_signal(pipeline.id, &Signal::ScoreUpdated { score: 88 }, now()).unwrap();
            engine.apply_signal(pipeline.id, &Signal::QuoteGenerated { amount: None }, now()).unwrap();

            let stored = db.get_pipeline(pipeline.id).unwrap().unwrap();
            assert_eq!(stored.current_stage, Stage::QuoteSent);
            assert_eq!(stored.auto_logged_events_count as usize, db.list_events(pipeline.id).unwrap().len());
            assert_eq!(stored.revision, pipeline.revision + 2);
        }
    }

    describe "unknown pipelines" {
        it "are reported as not found" {
            let (_db, engine) = setup();
            let id = Uuid::new_v4();
            let result = engine.apply_signal(id, &Signal::ReservationCreated, now());
            assert!(matches!(result, Err(CoreError::NotFound(missing)) if missing == id));
        }
    }
}
