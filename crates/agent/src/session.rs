//! Per-call conversation state
//!
//! Append-only turn history with strictly increasing ordinals, owned
//! exclusively by the bridge for the lifetime of one call. No session
//! outlives its call: on call end it is flushed to a transcript and
//! discarded.

use std::collections::HashSet;

use dispatch_agent_core::{
    ConversationTurn, FunctionCallRequest, FunctionCallResult, SessionError, Transcript,
    TurnContent, TurnRole,
};

/// In-memory state for one live call
pub struct ConversationSession {
    call_id: String,
    turns: Vec<ConversationTurn>,
    next_ordinal: u64,
    /// The one outstanding unresolved function call, if any
    pending_function: Option<FunctionCallRequest>,
    resolved_requests: HashSet<String>,
}

impl ConversationSession {
    pub fn new(call_id: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            turns: Vec::new(),
            next_ordinal: 0,
            pending_function: None,
            resolved_requests: HashSet::new(),
        }
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    pub fn pending_function(&self) -> Option<&FunctionCallRequest> {
        self.pending_function.as_ref()
    }

    /// Append a text turn, returning its ordinal
    pub fn append_text(&mut self, role: TurnRole, text: impl Into<String>) -> u64 {
        let ordinal = self.take_ordinal();
        self.turns.push(ConversationTurn::text(role, text, ordinal));
        ordinal
    }

    /// Append an assistant turn carrying a function-call request
    ///
    /// At most one function call may be outstanding per turn; a second
    /// request while one is unresolved is rejected.
    pub fn append_function_call(
        &mut self,
        mut request: FunctionCallRequest,
    ) -> Result<u64, SessionError> {
        if self.pending_function.is_some() {
            return Err(SessionError::FunctionAlreadyPending);
        }

        let ordinal = self.take_ordinal();
        request.origin_ordinal = ordinal;
        self.pending_function = Some(request.clone());
        self.turns.push(ConversationTurn::new(
            TurnRole::Assistant,
            TurnContent::FunctionCall { request },
            ordinal,
        ));
        Ok(ordinal)
    }

    /// Resolve the outstanding function call with its result turn
    ///
    /// The provider must never be asked to continue without seeing the
    /// resolved result, and a call may not be resolved twice.
    pub fn record_function_result(
        &mut self,
        result: FunctionCallResult,
    ) -> Result<u64, SessionError> {
        if self.resolved_requests.contains(&result.request_id) {
            return Err(SessionError::FunctionAlreadyResolved {
                request_id: result.request_id,
            });
        }

        match &self.pending_function {
            Some(pending) if pending.id == result.request_id => {}
            _ => return Err(SessionError::NoPendingFunction),
        }

        self.pending_function = None;
        self.resolved_requests.insert(result.request_id.clone());

        let ordinal = self.take_ordinal();
        self.turns.push(ConversationTurn::new(
            TurnRole::Function,
            TurnContent::FunctionResult { result },
            ordinal,
        ));
        Ok(ordinal)
    }

    /// Read-only point-in-time copy of the history
    ///
    /// The router never observes concurrent mutation mid-dispatch; it works
    /// from this owned snapshot.
    pub fn snapshot_history(&self) -> Vec<ConversationTurn> {
        self.turns.clone()
    }

    /// Flush to a transcript representation
    pub fn to_transcript(&self) -> Transcript {
        Transcript::new(self.call_id.clone(), self.turns.clone())
    }

    fn take_ordinal(&mut self) -> u64 {
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        ordinal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: &str) -> FunctionCallRequest {
        FunctionCallRequest {
            id: id.to_string(),
            name: "lookup_location".to_string(),
            arguments: serde_json::json!({ "truck_id": "42" }),
            origin_ordinal: 0,
        }
    }

    #[test]
    fn test_ordinals_strictly_increasing() {
        let mut session = ConversationSession::new("call-1");
        session.append_text(TurnRole::System, "prompt");
        session.append_text(TurnRole::User, "hi");
        session.append_function_call(request("fc_1")).unwrap();
        session
            .record_function_result(FunctionCallResult::ok(
                &request("fc_1"),
                serde_json::json!({ "lat": 1.0 }),
            ))
            .unwrap();
        session.append_text(TurnRole::Assistant, "done");

        let history = session.snapshot_history();
        assert_eq!(history.len(), 5);
        for window in history.windows(2) {
            assert!(window[1].ordinal > window[0].ordinal);
        }
        assert_eq!(history.last().unwrap().ordinal, 4);
    }

    #[test]
    fn test_function_call_origin_ordinal_assigned() {
        let mut session = ConversationSession::new("call-2");
        session.append_text(TurnRole::User, "hi");
        let ordinal = session.append_function_call(request("fc_1")).unwrap();
        assert_eq!(ordinal, 1);
        assert_eq!(session.pending_function().unwrap().origin_ordinal, 1);
    }

    #[test]
    fn test_double_resolve_rejected() {
        let mut session = ConversationSession::new("call-3");
        session.append_function_call(request("fc_1")).unwrap();
        let result = FunctionCallResult::ok(&request("fc_1"), serde_json::json!({}));

        session.record_function_result(result.clone()).unwrap();
        let err = session.record_function_result(result).unwrap_err();
        assert_eq!(
            err,
            SessionError::FunctionAlreadyResolved {
                request_id: "fc_1".to_string()
            }
        );
    }

    #[test]
    fn test_resolve_without_pending_rejected() {
        let mut session = ConversationSession::new("call-4");
        let err = session
            .record_function_result(FunctionCallResult::ok(
                &request("fc_9"),
                serde_json::json!({}),
            ))
            .unwrap_err();
        assert_eq!(err, SessionError::NoPendingFunction);
    }

    #[test]
    fn test_second_pending_function_rejected() {
        let mut session = ConversationSession::new("call-5");
        session.append_function_call(request("fc_1")).unwrap();
        let err = session.append_function_call(request("fc_2")).unwrap_err();
        assert_eq!(err, SessionError::FunctionAlreadyPending);
    }

    #[test]
    fn test_snapshot_is_point_in_time() {
        let mut session = ConversationSession::new("call-6");
        session.append_text(TurnRole::User, "one");
        let snapshot = session.snapshot_history();
        session.append_text(TurnRole::User, "two");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(session.turn_count(), 2);
    }
}
