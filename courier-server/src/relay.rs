//! Friend-graph event relay.
//!
//! Friendships change hands through the account API; the socket layer only
//! forwards lifecycle notices to the affected peer. Nothing here is durable:
//! a peer who is offline learns about the change on their next friends fetch.

use courier_proto::WsMessage;

use crate::delivery::push_to;
use crate::state::ServerState;
use crate::store::UserRecord;

pub fn friend_request(state: &ServerState, sender: &UserRecord, to: &str) {
    push_to(
        state,
        to,
        &WsMessage::FriendRequestReceived {
            user: sender.summary(),
        },
    );
}

pub fn friend_request_response(
    state: &ServerState,
    sender: &UserRecord,
    to: &str,
    accepted: bool,
) {
    let event = if accepted {
        WsMessage::FriendRequestAccepted {
            user: sender.summary(),
        }
    } else {
        WsMessage::FriendRequestRejected {
            user: sender.summary(),
        }
    };
    push_to(state, to, &event);
}

pub fn friend_remove(state: &ServerState, sender: &UserRecord, user_id: &str) {
    push_to(
        state,
        user_id,
        &WsMessage::FriendRemoved {
            user: sender.summary(),
        },
    );
}
