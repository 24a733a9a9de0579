// blackbox.rs
use crate::agent::Agent;
use crate::command::Command;
use crate::environment::Environment;
use crate::error::Error;
use crate::message::{Performative, Receiver};
use log::warn;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Objective value and constraint values for one evaluated point.
pub type ModelValues = (f64, Vec<f64>);

/// The model a blackbox session evaluates.
pub type Model = Arc<dyn Fn(&[f64]) -> ModelValues + Send + Sync>;

pub const COMMUNICATOR_NAME: &str = "communicator";
pub const EVALUATOR_NAME: &str = "evaluator";

type ResultSlot = Arc<Mutex<Option<Result<String, Error>>>>;

/// A solver-facing evaluation session.
///
/// The session plays the role the solver expects of a blackbox executable:
/// take a file of point coordinates, evaluate the model there, and emit one
/// output line (objective value first, then constraint values). Internally it
/// composes exactly two agents, a communicator that owns the input/output
/// ends and an evaluator that computes the model, coordinated purely through
/// the message protocol, never by direct calls:
///
/// 1. the environment seeds the communicator with the point,
/// 2. the communicator forwards an evaluate request to the evaluator,
/// 3. the evaluator replies with the values (or a failure),
/// 4. the communicator captures the output line and finalizes the
///    environment, stopping both agents.
///
/// One session per `Blackbox`: the agent names are fixed, so a second run on
/// the same instance would collide in the directory.
pub struct Blackbox {
    environment: Environment,
    model: Model,
}

impl Blackbox {
    pub fn new(name: &str, model: Model, poll_interval: Duration) -> Self {
        Self {
            environment: Environment::with_poll_interval(name, poll_interval),
            model,
        }
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Reads whitespace-separated point coordinates from the solver's input
    /// file.
    pub fn read_input(path: &Path) -> Result<Vec<f64>, Error> {
        let text = fs::read_to_string(path)?;
        text.split_whitespace()
            .map(|token| {
                token
                    .parse::<f64>()
                    .map_err(|_| Error::BadPoint(token.to_string()))
            })
            .collect()
    }

    /// Formats model values the way the solver reads them back: objective
    /// first, then every constraint value, space-separated.
    pub fn write_output(objective: f64, constraints: &[f64]) -> String {
        let mut line = objective.to_string();
        for value in constraints {
            line.push(' ');
            line.push_str(&value.to_string());
        }
        line
    }

    /// Runs one evaluation session over the given input file.
    pub fn run(&self, input: &Path) -> Result<String, Error> {
        let point = Self::read_input(input)?;
        self.evaluate(&point)
    }

    /// Evaluates one point through the two-agent session and returns the
    /// solver output line.
    pub fn evaluate(&self, point: &[f64]) -> Result<String, Error> {
        let env = &self.environment;
        let result: ResultSlot = Arc::new(Mutex::new(None));

        env.add_agent(self.make_evaluator())?;
        let communicator_id = env.add_agent(self.make_communicator(result.clone()))?;
        env.initialize();

        // Seed the session: the environment hands the point to the
        // communicator as a control message.
        env.post(
            Performative::Request,
            Receiver::Agent(communicator_id),
            json!({"action": "evaluate", "point": point}),
        );
        env.join();

        let outcome = result
            .lock()
            .expect("result lock poisoned")
            .take()
            .ok_or(Error::MissingResult)?;
        outcome
    }

    /// The broker computing the model. Answers peer evaluate requests with
    /// an inform carrying the values proposition, or a failure when the
    /// request carries no usable point.
    fn make_evaluator(&self) -> Agent {
        let mut agent = Agent::new(EVALUATOR_NAME);
        let model = self.model.clone();
        agent.on(
            Command::peer_action(Performative::Request, "evaluate"),
            move |core, info, msg| {
                let reply_to = Receiver::Agent(msg.sender.clone());
                let reply = match info.as_ref().and_then(point_of) {
                    Some(point) => {
                        let (objective, constraints) = model(&point);
                        core.compose(
                            Performative::Inform,
                            reply_to,
                            json!({"proposition": {
                                "what": "values",
                                "objective": objective,
                                "constraints": constraints,
                            }}),
                        )?
                    }
                    None => core.compose(
                        Performative::Failure,
                        reply_to,
                        json!({"proposition": {
                            "what": "values",
                            "reason": "request carries no point",
                        }}),
                    )?,
                };
                core.send_message(reply)?;
                Ok(())
            },
        );
        agent
    }

    /// The worker owning the solver-facing ends. Forwards the seeded point
    /// to the evaluator, captures the resulting output line, and shuts the
    /// session down.
    fn make_communicator(&self, result: ResultSlot) -> Agent {
        let mut agent = Agent::new(COMMUNICATOR_NAME);

        agent.on(
            Command::control(Performative::Request, "evaluate"),
            |core, info, _msg| {
                let env = core.environment().cloned().ok_or_else(|| Error::Unregistered {
                    agent: core.name().to_string(),
                })?;
                let Some(evaluator) = env.directory_service().lookup(EVALUATOR_NAME) else {
                    warn!("{}: no evaluator enrolled, dropping request", core.name());
                    return Ok(());
                };
                let request = core.compose(
                    Performative::Request,
                    Receiver::Agent(evaluator),
                    info.unwrap_or(Value::Null),
                )?;
                core.send_message(request)?;
                Ok(())
            },
        );

        let on_values = result.clone();
        agent.on(
            Command::peer_action(Performative::Inform, "values"),
            move |core, info, _msg| {
                let line = info
                    .as_ref()
                    .and_then(values_of)
                    .map(|(objective, constraints)| Self::write_output(objective, &constraints))
                    .ok_or(Error::MissingResult);
                *on_values.lock().expect("result lock poisoned") = Some(line);
                if let Some(env) = core.environment() {
                    env.finalize();
                }
                Ok(())
            },
        );

        let on_failure = result;
        agent.on(
            Command::peer_action(Performative::Failure, "values"),
            move |core, info, _msg| {
                let reason = info
                    .as_ref()
                    .and_then(|info| info["proposition"]["reason"].as_str())
                    .unwrap_or("unspecified")
                    .to_string();
                *on_failure.lock().expect("result lock poisoned") =
                    Some(Err(Error::Evaluation(reason)));
                if let Some(env) = core.environment() {
                    env.finalize();
                }
                Ok(())
            },
        );

        agent
    }
}

/// Extracts the point from decoded evaluate-request content.
fn point_of(info: &Value) -> Option<Vec<f64>> {
    info.get("point")?.as_array()?.iter().map(Value::as_f64).collect()
}

/// Extracts objective and constraint values from an inform-values payload.
fn values_of(info: &Value) -> Option<ModelValues> {
    let proposition = info.get("proposition")?;
    let objective = proposition.get("objective")?.as_f64()?;
    let constraints = match proposition.get("constraints") {
        Some(Value::Array(items)) => items.iter().map(Value::as_f64).collect::<Option<_>>()?,
        _ => Vec::new(),
    };
    Some((objective, constraints))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::AgentId;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Sphere objective with one unit-ball constraint.
    fn sphere() -> Model {
        Arc::new(|point: &[f64]| {
            let objective = point.iter().map(|x| x * x).sum::<f64>();
            (objective, vec![objective - 1.0])
        })
    }

    fn input_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    #[test]
    fn test_read_input_splits_whitespace() {
        let file = input_file("1.0 2.5\n -3

  4e-1 ");
        let point = Blackbox::read_input(file.path()).unwrap();
        assert_eq!(point, vec![1.0, 2.5, -3.0, 0.4]);
    }

    #[test]
    fn test_read_input_rejects_garbage() {
        let file = input_file("1.0 oops 2.0");
        assert!(matches!(
            Blackbox::read_input(file.path()),
            Err(Error::BadPoint(token)) if token == "oops"
        ));
    }

    #[test]
    fn test_write_output_is_objective_then_constraints() {
        assert_eq!(Blackbox::write_output(5.0, &[4.0, -0.5]), "5 4 -0.5");
        assert_eq!(Blackbox::write_output(2.25, &[]), "2.25");
    }

    #[test]
    fn test_session_evaluates_a_point_end_to_end() {
        let file = input_file("1.0 2.0");
        let blackbox = Blackbox::new("bb-session", sphere(), Duration::from_millis(5));
        let line = blackbox.run(file.path()).unwrap();
        assert_eq!(line, "5 4");
        // Both agents wound down; the directory still knows them.
        assert_eq!(blackbox.environment().directory_service().len(), 2);
    }

    #[test]
    fn test_evaluator_failure_surfaces_as_an_error() {
        let blackbox = Blackbox::new("bb-failure", sphere(), Duration::from_millis(5));
        let env = blackbox.environment();
        let result: ResultSlot = Arc::new(Mutex::new(None));

        let mut evaluator = blackbox.make_evaluator();
        evaluator.register(env).unwrap();
        let mut probe = blackbox.make_communicator(result.clone());
        let probe_id = probe.register(env).unwrap();

        // A request without a point: the evaluator must answer with failure.
        let request = probe
            .core()
            .compose(
                Performative::Request,
                Receiver::Agent(AgentId::derive(EVALUATOR_NAME)),
                json!({"action": "evaluate"}),
            )
            .unwrap();
        probe.send_message(request).unwrap();

        let pending = evaluator.fetch_messages();
        assert_eq!(pending.len(), 1);
        evaluator.handle_message(&pending[0]);

        let replies = probe.fetch_messages();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].performative, Performative::Failure);
        assert_eq!(replies[0].receiver, Receiver::Agent(probe_id));
        probe.handle_message(&replies[0]);

        let captured = result.lock().unwrap().take().unwrap();
        assert!(matches!(captured, Err(Error::Evaluation(_))));
    }

    #[test]
    fn test_point_extraction_requires_numbers() {
        assert_eq!(
            point_of(&json!({"point": [1.0, 2.0]})),
            Some(vec![1.0, 2.0])
        );
        assert_eq!(point_of(&json!({"point": [1.0, "x"]})), None);
        assert_eq!(point_of(&json!({"action": "evaluate"})), None);
    }
}
