//! Concurrent cash-outs racing the crash on a multi-threaded runtime

use aviastar::games::{FixedCrashPoints, RoundEvent, RoundStatus};
use aviastar::in_memory::{InMemoryBalances, InMemoryBets};
use aviastar::{AviastarConfig, BetOutcome, CrashGameService, GameError, Multiplier, UserId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{sleep, timeout};

const PLAYERS: UserId = 64;
const STAKE: u64 = 1000;
const START_BALANCE: u64 = 10_000;

fn racing_service(balances: Arc<InMemoryBalances>, bets: Arc<InMemoryBets>) -> CrashGameService {
    let mut config = AviastarConfig::default();
    config.game.tick_interval_ms = 1;
    config.game.multiplier_step = 1;

    CrashGameService::builder()
        .with_config(config)
        .with_balances(balances)
        .with_bets(bets)
        .with_crash_points(Arc::new(FixedCrashPoints::always(Multiplier::from_hundredths(150))))
        .build()
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_every_bet_settles_exactly_once() {
    let balances = Arc::new(InMemoryBalances::with_balances(
        (1..=PLAYERS).map(|user_id| (user_id, START_BALANCE)),
    ));
    let bets = Arc::new(InMemoryBets::new());
    let service = Arc::new(racing_service(balances.clone(), bets.clone()));
    let mut events = service.subscribe();

    for user_id in 1..=PLAYERS {
        service.place_bet(user_id, STAKE).await.unwrap();
    }

    // Spread the requests over the whole round so some land after the crash
    let handles: Vec<_> = (1..=PLAYERS)
        .map(|user_id| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                sleep(Duration::from_millis(user_id as u64)).await;
                (user_id, service.cash_out(user_id).await)
            })
        })
        .collect();

    let mut payouts = Vec::new();
    for handle in handles {
        let (user_id, result) = handle.await.unwrap();
        match result {
            Ok(receipt) => payouts.push((user_id, receipt.payout)),
            Err(err) => assert_eq!(err.as_game(), Some(&GameError::AlreadySettled { user_id })),
        }
    }

    let losers = timeout(Duration::from_secs(10), async {
        loop {
            match events.recv().await {
                Ok(RoundEvent::Crashed { losers, .. }) => return losers,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("event stream closed"),
            }
        }
    })
    .await
    .expect("round never crashed");

    service.shutdown().await;

    assert_eq!(payouts.len() + losers, PLAYERS as usize);
    assert_eq!(bets.unsettled_count(), 0);
    assert_eq!(bets.settled_count(BetOutcome::Won), payouts.len());
    assert_eq!(bets.settled_count(BetOutcome::Lost), losers);

    for user_id in 1..=PLAYERS {
        let records = bets.records_for(user_id);
        assert_eq!(records.len(), 1);

        let expected = match payouts.iter().find(|(winner, _)| *winner == user_id) {
            Some((_, payout)) => {
                assert_eq!(records[0].outcome, Some(BetOutcome::Won));
                assert!(*payout >= STAKE && *payout <= STAKE * 150 / 100);
                START_BALANCE - STAKE + payout
            }
            None => {
                assert_eq!(records[0].outcome, Some(BetOutcome::Lost));
                START_BALANCE - STAKE
            }
        };
        assert_eq!(balances.get(user_id), Some(expected));
    }

    let metrics = service.metrics();
    assert_eq!(metrics.cashouts as usize, payouts.len());
    assert_eq!(metrics.losses as usize, losers);
    assert_eq!(metrics.total_paid_out, payouts.iter().map(|(_, payout)| payout).sum::<u64>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_repeated_cash_out_pays_once() {
    let balances = Arc::new(InMemoryBalances::with_balances([(1, START_BALANCE)]));
    let bets = Arc::new(InMemoryBets::new());
    let service = Arc::new(racing_service(balances.clone(), bets.clone()));

    service.place_bet(1, STAKE).await.unwrap();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.cash_out(1).await })
        })
        .collect();

    let mut wins = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => wins += 1,
            Err(err) => assert_eq!(err.as_game(), Some(&GameError::AlreadySettled { user_id: 1 })),
        }
    }
    service.shutdown().await;

    assert!(wins <= 1);
    let records = bets.records_for(1);
    assert_eq!(records.len(), 1);
    assert!(records[0].outcome.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_racing_first_bet_leaves_no_round_behind() {
    for _ in 0..50 {
        let balances = Arc::new(InMemoryBalances::with_balances([(1, START_BALANCE)]));
        let bets = Arc::new(InMemoryBets::new());
        let service = Arc::new(racing_service(balances.clone(), bets.clone()));

        let bettor = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.place_bet(1, STAKE).await })
        };
        let stopper = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.shutdown().await })
        };

        timeout(Duration::from_secs(10), stopper)
            .await
            .expect("shutdown hung")
            .unwrap();
        let placed = bettor.await.unwrap();

        let metrics = service.metrics();
        assert_eq!(service.snapshot().status, RoundStatus::Idle);
        assert_eq!(metrics.rounds_crashed, metrics.rounds_started);

        match placed {
            Ok(_) => {
                assert_eq!(metrics.rounds_started, 1);
                assert_eq!(bets.settled_count(BetOutcome::Lost) + bets.settled_count(BetOutcome::Won), 1);
            }
            Err(err) => {
                assert_eq!(err.as_game(), Some(&GameError::ShuttingDown));
                assert_eq!(balances.get(1), Some(START_BALANCE));
            }
        }
    }
}
