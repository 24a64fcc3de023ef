//! Restores are refused when the client's state hash disagrees with its
//! sync log.

use casesync_sync_protocol::CaseStateHash;
use casesync_sync_server::RestoreRequest;
use casesync_testkit::prelude::*;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn mismatched_hash_is_rejected(ids in case_id_set_strategy(6), extra in case_id_strategy()) {
        let server = TestServer::new();
        let mut form = FormBuilder::new("f1");
        for id in &ids {
            form = form.block(CaseBlock::new(id.as_str()).create("t", id));
        }
        server.submit(form);
        let token = restore_id(&server.restore_payload(None)).unwrap();

        let good = CaseStateHash::compute(&ids);
        let ok = server.restore(
            RestoreRequest::new().with_restore_id(&token).with_state_hash(good.to_string()),
        );
        prop_assert!(ok.is_success());

        let mut claimed = ids.clone();
        if claimed.contains(&extra) {
            claimed.pop();
        } else {
            claimed.push(extra);
        }
        let bad = CaseStateHash::compute(&claimed);
        let rejected = server.restore(
            RestoreRequest::new().with_restore_id(&token).with_state_hash(bad.to_string()),
        );
        prop_assert_eq!(rejected.status, 412);
        prop_assert!(rejected.body.contains("ota_restore_error"));
    }
}

#[test]
fn stale_token_without_hash_still_restores() {
    let server = TestServer::new();
    server.submit(FormBuilder::new("f1").block(CaseBlock::new("c1").create("t", "one")));
    let token = restore_id(&server.restore_payload(None)).unwrap();
    let response = server.restore(RestoreRequest::new().with_restore_id(&token));
    assert!(response.is_success());
}

#[test]
fn unknown_token_requires_fresh_restore() {
    let server = TestServer::new();
    let response = server.restore(RestoreRequest::new().with_restore_id("missing"));
    assert_eq!(response.status, 412);
}
