// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::*;
use pretty_assertions::assert_eq;

/// Payer and payee run separate managers over the same chain.
#[tokio::test]
async fn pay_redeem_settle_collect() {
    let h = Harness::new();
    let payee = PaychManager::new(
        Arc::new(MemoryDB::default()),
        h.chain.clone(),
        Arc::new(Mutex::new(h.remote_wallet.clone())),
        PaychConfig::default(),
    );

    let ch = h.funded_outbound(100).await;
    assert_eq!(h.mgr.get_channel_info(&ch).unwrap().amount, atto(100));

    let lane = h.mgr.allocate_lane(&ch).await.unwrap();
    assert_eq!(lane, 0);
    let v1 = h
        .mgr
        .create_voucher(&ch, lane, atto(60))
        .await
        .unwrap()
        .voucher
        .unwrap();
    assert_eq!(v1.nonce, 1);
    // re-adding what was just created changes nothing
    assert_eq!(
        h.mgr
            .add_voucher_outbound(&ch, v1.clone(), vec![], &atto(0))
            .await
            .unwrap(),
        atto(0)
    );
    let v2 = h
        .mgr
        .create_voucher(&ch, lane, atto(90))
        .await
        .unwrap()
        .voucher
        .unwrap();
    assert_eq!(v2.nonce, 2);
    assert_eq!(h.mgr.list_vouchers(&ch).await.unwrap().len(), 2);

    // vouchers travel as strings
    let received = [&v1, &v2].map(|sv| SignedVoucher::decode_string(&sv.encode_string().unwrap()).unwrap());
    assert_eq!(
        payee
            .add_voucher_inbound(&ch, received[0].clone(), vec![], &atto(10))
            .await
            .unwrap(),
        atto(60)
    );
    assert_eq!(
        payee
            .add_voucher_inbound(&ch, received[1].clone(), vec![], &atto(10))
            .await
            .unwrap(),
        atto(30)
    );
    let ci = payee.get_channel_info(&ch).unwrap();
    assert_eq!(ci.direction, Direction::Inbound);
    assert_eq!(ci.from(), h.local);
    assert_eq!(ci.to(), h.remote);

    let best = payee.best_spendable(&ch).await.unwrap();
    assert_eq!(best.len(), 1);
    assert_eq!(best[&lane], v2);
    assert_eq!(payee.voucher_spendable_delta(&ch, &v2).await.unwrap(), atto(90));

    let redeem = payee.submit_voucher(&ch, &v2, &[], &[]).await.unwrap();
    assert_eq!(payee.wait_msg(redeem).await.unwrap(), ch);
    assert!(payee.best_spendable(&ch).await.unwrap().is_empty());
    assert_eq!(payee.voucher_spendable_delta(&ch, &v2).await.unwrap(), atto(0));

    // the payer sees the redemption on chain
    assert!(h.mgr.best_spendable(&ch).await.unwrap().is_empty());
    assert_eq!(h.mgr.next_sequence_for_lane(&ch, lane).await.unwrap(), 3);

    h.chain.set_head(50);
    let settle = h.mgr.settle(&ch).await.unwrap();
    assert_eq!(h.mgr.wait_msg(settle).await.unwrap(), ch);
    assert_eq!(
        h.mgr.create_voucher(&ch, lane, atto(95)).await.unwrap_err(),
        Error::ChannelSettled(ch)
    );

    h.chain.set_head(50 + SETTLE_DELAY);
    let collect = h.mgr.collect(&ch).await.unwrap();
    assert_eq!(h.mgr.wait_msg(collect).await.unwrap(), ch);
    assert!(h.mgr.list_channels().unwrap().is_empty());
    assert_eq!(
        h.mgr.create_voucher(&ch, lane, atto(95)).await.unwrap_err(),
        Error::ChannelSettled(ch)
    );

    assert_eq!(
        h.chain.sent(),
        vec![
            MsgOp::Create {
                from: h.local,
                to: h.remote,
                amount: atto(100)
            },
            MsgOp::Submit {
                channel: ch,
                voucher: v2
            },
            MsgOp::Settle { channel: ch },
            MsgOp::Collect { channel: ch },
        ]
    );
}
