//! Boundary commands: one JSON request in, one JSON reply out.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    db::{NewSpot, SpotPatch},
    error::{AdapterError, SpotError},
};

use super::{CheckOutcome, SpotCheckResult, SpotEngine};

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    ListSpots,
    GetSpot {
        spot_id: String,
    },
    CreateSpot {
        #[serde(default)]
        id: Option<String>,
        name: String,
        #[serde(default)]
        description: String,
        image_source_ref: String,
    },
    UpdateSpot {
        spot_id: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        image_source_ref: Option<String>,
    },
    Check {
        spot_id: String,
        #[serde(default)]
        force: bool,
    },
    CheckAll {
        #[serde(default)]
        force: bool,
    },
    Reset {
        spot_id: String,
        #[serde(default)]
        confirm: bool,
    },
    Snooze {
        spot_id: String,
        #[serde(default)]
        hours: Option<f64>,
    },
    Unsnooze {
        spot_id: String,
    },
    DeleteSpot {
        spot_id: String,
    },
    History {
        spot_id: String,
        #[serde(default)]
        limit: Option<u64>,
    },
    Stats {
        spot_id: String,
    },
    ListCameras,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CommandError {
    pub kind: String,
    pub message: String,
}

impl CommandError {
    fn invalid(message: impl Into<String>) -> Self {
        Self {
            kind: "validation_error".into(),
            message: message.into(),
        }
    }
}

impl From<SpotError> for CommandError {
    fn from(err: SpotError) -> Self {
        Self {
            kind: err.kind().into(),
            message: err.to_string(),
        }
    }
}

impl From<AdapterError> for CommandError {
    fn from(err: AdapterError) -> Self {
        Self {
            kind: "adapter_error".into(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CommandError {
    fn from(err: serde_json::Error) -> Self {
        Self {
            kind: "internal_error".into(),
            message: err.to_string(),
        }
    }
}

fn ok() -> Value {
    json!({ "status": "ok" })
}

fn check_result(result: SpotCheckResult) -> Result<Value, CommandError> {
    let mut entry = match result.outcome {
        Ok(outcome) => serde_json::to_value(&outcome)?,
        Err(err) => json!({
            "status": err.kind(),
            "error": err.to_string(),
        }),
    };
    if let Value::Object(map) = &mut entry {
        map.insert("spot_id".into(), Value::String(result.spot_id));
    }
    Ok(entry)
}

fn outcome(outcome: CheckOutcome) -> Result<Value, CommandError> {
    Ok(serde_json::to_value(&outcome)?)
}

pub async fn dispatch(engine: &SpotEngine, command: Command) -> Result<Value, CommandError> {
    match command {
        Command::ListSpots => Ok(serde_json::to_value(engine.list_spots().await?)?),
        Command::GetSpot { spot_id } => Ok(serde_json::to_value(engine.get_spot(&spot_id).await?)?),
        Command::CreateSpot {
            id,
            name,
            description,
            image_source_ref,
        } => {
            let spot = engine
                .create_spot(NewSpot {
                    id,
                    name,
                    description,
                    image_source_ref,
                })
                .await?;
            Ok(serde_json::to_value(spot)?)
        }
        Command::UpdateSpot {
            spot_id,
            name,
            description,
            image_source_ref,
        } => {
            let patch = SpotPatch {
                name,
                description,
                image_source_ref,
            };
            Ok(serde_json::to_value(engine.update_spot(&spot_id, patch).await?)?)
        }
        Command::Check { spot_id, force } => outcome(engine.check(&spot_id, force).await?),
        Command::CheckAll { force } => {
            let results = engine
                .check_all(force)
                .await?
                .into_iter()
                .map(check_result)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(json!({ "results": results }))
        }
        Command::Reset { spot_id, confirm } => {
            if !confirm {
                return Err(CommandError::invalid(
                    "reset erases all history; resend with \"confirm\": true",
                ));
            }
            engine.reset(&spot_id).await?;
            Ok(ok())
        }
        Command::Snooze { spot_id, hours } => {
            let hours = hours.ok_or_else(|| CommandError::invalid("snooze requires \"hours\""))?;
            let until = engine.snooze(&spot_id, hours).await?;
            Ok(json!({ "status": "ok", "snoozed_until": until }))
        }
        Command::Unsnooze { spot_id } => {
            engine.unsnooze(&spot_id).await?;
            Ok(ok())
        }
        Command::DeleteSpot { spot_id } => {
            engine.delete(&spot_id).await?;
            Ok(ok())
        }
        Command::History { spot_id, limit } => {
            Ok(serde_json::to_value(engine.history(&spot_id, limit).await?)?)
        }
        Command::Stats { spot_id } => Ok(serde_json::to_value(engine.stats(&spot_id).await?)?),
        Command::ListCameras => Ok(serde_json::to_value(engine.list_cameras().await?)?),
    }
}

/// A command line as read from the boundary. `request_id` is echoed on the reply.
#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    request_id: Option<Value>,
    #[serde(flatten)]
    command: Command,
}

#[derive(Debug, Serialize)]
struct Reply {
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ok: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<CommandError>,
}

/// Parse one request line, run it and render the reply line.
pub async fn handle_line(engine: &SpotEngine, line: &str) -> String {
    let reply = match serde_json::from_str::<Request>(line) {
        Ok(Request {
            request_id,
            command,
        }) => match dispatch(engine, command).await {
            Ok(value) => Reply {
                request_id,
                ok: Some(value),
                error: None,
            },
            Err(error) => Reply {
                request_id,
                ok: None,
                error: Some(error),
            },
        },
        Err(err) => Reply {
            request_id: None,
            ok: None,
            error: Some(CommandError::invalid(format!("malformed command: {err}"))),
        },
    };

    serde_json::to_string(&reply).unwrap_or_else(|err| internal_error_line(&err.to_string()))
}

fn internal_error_line(message: &str) -> String {
    json!({ "error": { "kind": "internal_error", "message": message } }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    use crate::camera::Camera;
    use crate::engine::testing::{ScriptedCamera, ScriptedClassifier, TestBed};

    fn bed() -> TestBed {
        TestBed::new(
            ScriptedCamera::serving_frames().with_cameras(vec![Camera {
                entity_id: "camera.driveway".into(),
                name: "Driveway".into(),
                state: "idle".into(),
            }]),
            ScriptedClassifier::replying(r#"{"state": "free"}"#),
        )
    }

    async fn run(bed: &TestBed, request: Value) -> Value {
        let line = handle_line(&bed.engine, &request.to_string()).await;
        serde_json::from_str(&line).unwrap()
    }

    #[test]
    fn commands_parse_from_tagged_json() {
        let command: Command =
            serde_json::from_value(json!({ "op": "check", "spot_id": "bay" })).unwrap();
        assert_eq!(
            command,
            Command::Check {
                spot_id: "bay".into(),
                force: false,
            }
        );

        let command: Command =
            serde_json::from_value(json!({ "op": "snooze", "spot_id": "bay", "hours": 1.5 }))
                .unwrap();
        assert_eq!(
            command,
            Command::Snooze {
                spot_id: "bay".into(),
                hours: Some(1.5),
            }
        );

        assert!(serde_json::from_value::<Command>(json!({ "op": "explode" })).is_err());
    }

    #[tokio::test]
    async fn create_check_and_list_round_trip_through_lines() {
        let bed = bed();
        let created = run(
            &bed,
            json!({
                "request_id": 7,
                "op": "create_spot",
                "id": "driveway",
                "name": "Driveway",
                "image_source_ref": "camera.driveway",
            }),
        )
        .await;
        assert_eq!(created["request_id"], json!(7));
        assert_eq!(created["ok"]["id"], json!("driveway"));
        let spot_id = "driveway";
        assert_eq!(created["ok"]["state"], json!("unknown"));

        let checked = run(&bed, json!({ "op": "check", "spot_id": spot_id })).await;
        assert_eq!(checked["ok"]["status"], json!("completed"));
        assert_eq!(checked["ok"]["state"], json!("free"));
        assert_eq!(checked["ok"]["previous_state"], json!("unknown"));

        let listed = run(&bed, json!({ "op": "list_spots" })).await;
        assert_eq!(listed["ok"][0]["state"], json!("free"));

        let history = run(&bed, json!({ "op": "history", "spot_id": spot_id, "limit": 5 })).await;
        assert_eq!(history["ok"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reset_requires_confirmation() {
        let bed = bed();
        let spot = bed.spot("Bay", "camera.bay").await;
        bed.engine.check(&spot.id, false).await.unwrap();

        let refused = run(&bed, json!({ "op": "reset", "spot_id": spot.id })).await;
        assert_eq!(refused["error"]["kind"], json!("validation_error"));
        assert_eq!(bed.engine.history(&spot.id, None).await.unwrap().len(), 1);

        let done = run(
            &bed,
            json!({ "op": "reset", "spot_id": spot.id, "confirm": true }),
        )
        .await;
        assert_eq!(done["ok"], json!({ "status": "ok" }));
        assert!(bed.engine.history(&spot.id, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn snooze_reports_deadline_and_validates_hours() {
        let bed = bed();
        let spot = bed.spot("Bay", "camera.bay").await;

        let snoozed = run(&bed, json!({ "op": "snooze", "spot_id": spot.id, "hours": 2 })).await;
        assert_eq!(snoozed["ok"]["status"], json!("ok"));
        assert!(snoozed["ok"]["snoozed_until"].is_string());

        let skipped = run(&bed, json!({ "op": "check", "spot_id": spot.id })).await;
        assert_eq!(skipped["ok"]["status"], json!("skipped"));
        assert_eq!(skipped["ok"]["reason"], json!("snoozed"));

        let missing = run(&bed, json!({ "op": "snooze", "spot_id": spot.id })).await;
        assert_eq!(missing["error"]["kind"], json!("validation_error"));

        let negative =
            run(&bed, json!({ "op": "snooze", "spot_id": spot.id, "hours": -3 })).await;
        assert_eq!(negative["error"]["kind"], json!("validation_error"));
    }

    #[tokio::test]
    async fn check_all_entries_carry_spot_ids() {
        let bed = bed();
        let first = bed.spot("First", "camera.first").await;
        let second = bed.spot("Second", "camera.second").await;
        bed.engine.snooze(&second.id, 1.0).await.unwrap();

        let reply = run(&bed, json!({ "op": "check_all" })).await;
        let results = reply["ok"]["results"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["spot_id"], json!(first.id));
        assert_eq!(results[0]["status"], json!("completed"));
        assert_eq!(results[1]["spot_id"], json!(second.id));
        assert_eq!(results[1]["status"], json!("skipped"));
    }

    #[test]
    fn rejected_check_entries_use_error_kind_as_status() {
        let entry = check_result(SpotCheckResult {
            spot_id: "bay".into(),
            outcome: Err(SpotError::InProgress("bay".into())),
        })
        .unwrap();
        assert_eq!(
            entry,
            json!({
                "spot_id": "bay",
                "status": "in_progress",
                "error": "check already in progress for spot bay",
            })
        );
    }

    #[tokio::test]
    async fn errors_carry_kind_and_echo_request_id() {
        let bed = bed();

        let missing = run(&bed, json!({ "request_id": "req-1", "op": "get_spot", "spot_id": "nope" }))
                .await;
        assert_eq!(missing["request_id"], json!("req-1"));
        assert_eq!(missing["error"]["kind"], json!("not_found"));
        assert!(missing.get("ok").is_none());

        let garbage = handle_line(&bed.engine, "not json").await;
        let garbage: Value = serde_json::from_str(&garbage).unwrap();
        assert_eq!(garbage["error"]["kind"], json!("validation_error"));
    }

    #[tokio::test]
    async fn oversized_history_limit_is_a_validation_error() {
        let bed = bed();
        let spot = bed.spot("Bay", "camera.bay").await;

        let reply = run(
            &bed,
            json!({ "op": "history", "spot_id": spot.id, "limit": u64::MAX }),
        )
        .await;
        assert_eq!(reply["error"]["kind"], json!("validation_error"));
    }

    #[tokio::test]
    async fn reset_during_check_reports_in_progress() {
        let bed = TestBed::new(
            ScriptedCamera::serving_frames(),
            ScriptedClassifier::replying(r#"{"state": "occupied"}"#)
                .with_delay(std::time::Duration::from_millis(200)),
        );
        let spot = bed.spot("Bay", "camera.bay").await;

        let engine = bed.engine.clone();
        let spot_id = spot.id.clone();
        let running = tokio::spawn(async move { engine.check(&spot_id, false).await });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let reply = run(
            &bed,
            json!({ "op": "reset", "spot_id": spot.id, "confirm": true }),
        )
        .await;
        assert_eq!(reply["error"]["kind"], json!("in_progress"));
        running.await.unwrap().unwrap();
    }

    #[test]
    fn internal_error_line_escapes_its_message() {
        let line = internal_error_line(r#"bad "value" \ here"#);
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(
            parsed,
            json!({ "error": { "kind": "internal_error", "message": r#"bad "value" \ here"# } })
        );
    }

    #[tokio::test]
    async fn cameras_delete_and_stats() {
        let bed = bed();
        let cameras = run(&bed, json!({ "op": "list_cameras" })).await;
        assert_eq!(cameras["ok"][0]["entity_id"], json!("camera.driveway"));

        let spot = bed.spot("Bay", "camera.bay").await;
        bed.engine.check(&spot.id, false).await.unwrap();
        let stats = run(&bed, json!({ "op": "stats", "spot_id": spot.id })).await;
        assert_eq!(stats["ok"]["total_checks"], json!(1));
        assert_eq!(stats["ok"]["occupied_rate"], json!(0.0));

        let deleted = run(&bed, json!({ "op": "delete_spot", "spot_id": spot.id })).await;
        assert_eq!(deleted["ok"], json!({ "status": "ok" }));
        let gone = run(&bed, json!({ "op": "get_spot", "spot_id": spot.id })).await;
        assert_eq!(gone["error"]["kind"], json!("not_found"));
    }
}
