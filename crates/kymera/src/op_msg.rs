//! Unsolicited messages raised by DSP operators.
//!
//! Layout: `[msg_id, event_id, payload0, ...]`.

use crate::chains::KymeraIndication;
use crate::error::OpMsgError;

pub const OP_MSG_MAX_WORDS: usize = 8;
const OP_MSG_LEN: usize = 3;

const WORD_MSG_ID: usize = 0;
const WORD_EVENT_ID: usize = 1;
const WORD_PAYLOAD_0: usize = 2;
/// Payload word sent with indications that carry no value.
pub const PAYLOAD_NA: u16 = 0;

const MSG_ID_TONE_END: u16 = 1;
const MSG_ID_AANC_EVENT_TRIGGER: u16 = 7;
const MSG_ID_AANC_EVENT_CLEAR: u16 = 8;
const MSG_ID_FIT_TEST: u16 = 11;

const FIT_TEST_EVENT_ID: u16 = 0;
const FIT_TEST_RESULT_BAD: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AancEvent {
    EdActive,
    EdInactiveGainUnchanged,
    QuietMode,
    BadEnvironment,
}

impl AancEvent {
    fn from_id(id: u16) -> Option<Self> {
        match id {
            1 => Some(AancEvent::EdActive),
            2 => Some(AancEvent::EdInactiveGainUnchanged),
            3 => Some(AancEvent::QuietMode),
            4 => Some(AancEvent::BadEnvironment),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OperatorEvent {
    ToneEnd,
    AancTrigger { event: AancEvent, payload: u16 },
    AancClear { event: AancEvent, payload: u16 },
    FitTest { good: bool },
    /// Recognised message with an event nobody listens for.
    Ignored,
}

impl OperatorEvent {
    /// Client indication and payload word this event turns into.
    pub fn indication(&self) -> Option<(KymeraIndication, u16)> {
        use KymeraIndication as I;
        match *self {
            OperatorEvent::AancTrigger { event, payload } => Some(match event {
                AancEvent::EdActive => (I::AancEdActiveTrigger, payload),
                AancEvent::EdInactiveGainUnchanged => {
                    (I::AancEdInactiveTrigger, payload)
                }
                AancEvent::QuietMode => (I::AancQuietModeTrigger, PAYLOAD_NA),
                AancEvent::BadEnvironment => {
                    (I::AancBadEnvironmentTrigger, payload)
                }
            }),
            OperatorEvent::AancClear { event, payload } => Some(match event {
                AancEvent::EdActive => (I::AancEdActiveClear, payload),
                AancEvent::EdInactiveGainUnchanged => {
                    (I::AancEdInactiveClear, payload)
                }
                AancEvent::QuietMode => (I::AancQuietModeClear, PAYLOAD_NA),
                AancEvent::BadEnvironment => (I::AancBadEnvironmentClear, payload),
            }),
            OperatorEvent::FitTest { good: true } => Some((I::GoodFit, PAYLOAD_NA)),
            OperatorEvent::FitTest { good: false } => Some((I::BadFit, PAYLOAD_NA)),
            OperatorEvent::ToneEnd | OperatorEvent::Ignored => None,
        }
    }
}

pub fn decode(words: &[u16]) -> Result<OperatorEvent, OpMsgError> {
    if words.len() < OP_MSG_LEN {
        return Err(OpMsgError::BadLength(words.len()));
    }
    let event_id = words[WORD_EVENT_ID];
    let payload = words[WORD_PAYLOAD_0];

    match words[WORD_MSG_ID] {
        MSG_ID_TONE_END => {
            if words.len() != OP_MSG_LEN {
                return Err(OpMsgError::BadLength(words.len()));
            }
            Ok(OperatorEvent::ToneEnd)
        }
        MSG_ID_AANC_EVENT_TRIGGER => Ok(AancEvent::from_id(event_id)
            .map_or(OperatorEvent::Ignored, |event| OperatorEvent::AancTrigger {
                event,
                payload,
            })),
        MSG_ID_AANC_EVENT_CLEAR => Ok(AancEvent::from_id(event_id)
            .map_or(OperatorEvent::Ignored, |event| OperatorEvent::AancClear {
                event,
                payload,
            })),
        MSG_ID_FIT_TEST if event_id == FIT_TEST_EVENT_ID => {
            Ok(OperatorEvent::FitTest { good: payload != FIT_TEST_RESULT_BAD })
        }
        MSG_ID_FIT_TEST => Ok(OperatorEvent::Ignored),
        id => Err(OpMsgError::UnknownMessage(id)),
    }
}
