//! Wire contract between the coordinator and its workers.
//!
//! Every frame is a single line of JSON: `{"tag": <code>, "payload": ...}`.
//!
//! | Tag | Payload                         | Direction            |
//! |-----|---------------------------------|----------------------|
//! | 100 | distance matrix (rows)          | coordinator → worker |
//! | 1   | `{index, payload}` task         | coordinator → worker |
//! | 2   | `{index, fitness}` result       | worker → coordinator |
//! | 99  | none                            | coordinator → worker |

use crate::{Result, TransportError};
use salesman_core::{DistanceMatrix, UNFIT};
use serde::{Deserialize, Serialize};

/// Numeric message tags. Stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Evaluate a tour, or end-of-batch sentinel
    Task = 1,
    /// Evaluation result
    Result = 2,
    /// No current work; the worker keeps running
    Terminate = 99,
    /// Replace the cached distance matrix
    MatrixUpdate = 100,
}

impl Tag {
    /// Wire code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Parse a wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Tag::Task),
            2 => Some(Tag::Result),
            99 => Some(Tag::Terminate),
            100 => Some(Tag::MatrixUpdate),
            _ => None,
        }
    }
}

/// One evaluation request. `index` is the position in the batch, used to
/// put results back in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Position in the batch, or `-1` for the end-of-batch sentinel
    pub index: i64,
    /// Tour to evaluate; `None` only for the sentinel
    pub payload: Option<Vec<usize>>,
}

impl Task {
    /// Index reserved for the end-of-batch sentinel.
    pub const END_OF_BATCH: i64 = -1;

    /// Request evaluation of `tour` at batch position `index`.
    pub fn new(index: usize, tour: Vec<usize>) -> Self {
        Self {
            index: index as i64,
            payload: Some(tour),
        }
    }

    /// "No more work this round."
    pub fn end_of_batch() -> Self {
        Self {
            index: Self::END_OF_BATCH,
            payload: None,
        }
    }

    /// Whether this is the end-of-batch sentinel.
    pub fn is_end_of_batch(&self) -> bool {
        self.index == Self::END_OF_BATCH && self.payload.is_none()
    }
}

/// Fitness computed by a worker for one task.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Batch position copied from the task
    pub index: i64,
    /// Tour cost; `+∞` when the tour could not be evaluated
    #[serde(with = "unfit_as_null")]
    pub fitness: f64,
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Tag 100
    MatrixUpdate(DistanceMatrix),
    /// Tag 1
    Task(Task),
    /// Tag 2
    Result(TaskResult),
    /// Tag 99
    Terminate,
}

impl Message {
    /// Tag this message travels under.
    pub fn tag(&self) -> Tag {
        match self {
            Message::MatrixUpdate(_) => Tag::MatrixUpdate,
            Message::Task(_) => Tag::Task,
            Message::Result(_) => Tag::Result,
            Message::Terminate => Tag::Terminate,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct WireFrame {
    tag: u8,
    #[serde(default)]
    payload: serde_json::Value,
}

/// Encode a message as one JSON line (without the trailing newline).
pub fn encode(message: &Message) -> Result<String> {
    let payload = match message {
        Message::MatrixUpdate(matrix) => serde_json::to_value(matrix)?,
        Message::Task(task) => serde_json::to_value(task)?,
        Message::Result(result) => serde_json::to_value(result)?,
        Message::Terminate => serde_json::Value::Null,
    };

    let frame = WireFrame {
        tag: message.tag().code(),
        payload,
    };
    Ok(serde_json::to_string(&frame)?)
}

/// Decode one JSON line.
pub fn decode(line: &str) -> Result<Message> {
    let frame: WireFrame =
        serde_json::from_str(line).map_err(|e| TransportError::Decode(e.to_string()))?;

    let tag = Tag::from_code(frame.tag)
        .ok_or_else(|| TransportError::Decode(format!("unknown tag {}", frame.tag)))?;

    let message = match tag {
        Tag::MatrixUpdate => Message::MatrixUpdate(payload(frame.payload)?),
        Tag::Task => Message::Task(payload(frame.payload)?),
        Tag::Result => Message::Result(payload(frame.payload)?),
        Tag::Terminate => Message::Terminate,
    };
    Ok(message)
}

/// Decode one raw line as read off a socket. A line that is not UTF-8 is a
/// decode error like any other malformed frame.
pub fn decode_bytes(line: &[u8]) -> Result<Message> {
    let line = std::str::from_utf8(line).map_err(|e| TransportError::Decode(e.to_string()))?;
    decode(line)
}

fn payload<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| TransportError::Decode(e.to_string()))
}

/// JSON has no infinity: unfit results travel as `null`.
mod unfit_as_null {
    use super::UNFIT;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(fitness: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if fitness.is_finite() {
            serializer.serialize_some(fitness)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(UNFIT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_codes_are_stable() {
        assert_eq!(Tag::Task.code(), 1);
        assert_eq!(Tag::Result.code(), 2);
        assert_eq!(Tag::Terminate.code(), 99);
        assert_eq!(Tag::MatrixUpdate.code(), 100);
        assert_eq!(Tag::from_code(42), None);
    }

    #[test]
    fn test_task_frame_layout() {
        let line = encode(&Message::Task(Task::new(3, vec![2, 0, 1]))).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["tag"], 1);
        assert_eq!(value["payload"]["index"], 3);
        assert_eq!(value["payload"]["payload"], serde_json::json!([2, 0, 1]));
    }

    #[test]
    fn test_end_of_batch_sentinel() {
        let line = encode(&Message::Task(Task::end_of_batch())).unwrap();
        let Message::Task(task) = decode(&line).unwrap() else {
            panic!("expected a task");
        };
        assert!(task.is_end_of_batch());
        assert_eq!(task.index, -1);

        let not_sentinel = Task { index: -1, payload: Some(vec![0]) };
        assert!(!not_sentinel.is_end_of_batch());
    }

    #[test]
    fn test_unfit_result_survives_json() {
        let line = encode(&Message::Result(TaskResult { index: 4, fitness: UNFIT })).unwrap();
        assert!(line.contains("null"));

        match decode(&line).unwrap() {
            Message::Result(result) => {
                assert_eq!(result.index, 4);
                assert!(result.fitness.is_infinite());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_matrix_and_terminate_frames() {
        let matrix = DistanceMatrix::from_rows(vec![vec![0.0, 1.0], vec![2.0, 0.0]]).unwrap();
        let line = encode(&Message::MatrixUpdate(matrix.clone())).unwrap();
        assert_eq!(decode(&line).unwrap(), Message::MatrixUpdate(matrix));

        let line = encode(&Message::Terminate).unwrap();
        assert_eq!(line, r#"{"tag":99,"payload":null}"#);
        assert_eq!(decode(&line).unwrap(), Message::Terminate);
        assert_eq!(decode(r#"{"tag":99}"#).unwrap(), Message::Terminate);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode("not json"), Err(TransportError::Decode(_))));
        assert!(matches!(decode(r#"{"tag":7}"#), Err(TransportError::Decode(_))));
        assert!(matches!(
            decode(r#"{"tag":100,"payload":[[0.0,1.0]]}"#),
            Err(TransportError::Decode(_))
        ));
    }

    #[test]
    fn test_decode_bytes_rejects_invalid_utf8() {
        assert!(matches!(
            decode_bytes(b"\xff\xfe garbage\n"),
            Err(TransportError::Decode(_))
        ));
        assert_eq!(decode_bytes(b"{\"tag\":99,\"payload\":null}\n").unwrap(), Message::Terminate);
    }
}
