mod common;

use std::sync::Arc;

use entity::{claim, donation};
use foodrescue_core::util::now_ts;
use foodrescue_core::{ClaimError, DonationStatus, Error, Principal, Role};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use tokio::sync::Barrier;

use common::{harness, pooled_harness};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_have_one_winner() {
    let h = harness().await;
    let donor = h.donor("dana@x.com").await;
    let donation_id = h.donation(&donor, "rice", "Whitefield", now_ts() + 3600).await;

    let mut ngos = Vec::new();
    for i in 0..8 {
        ngos.push(h.ngo(&format!("ngo{i}@x.com")).await);
    }

    let mut handles = Vec::new();
    for ngo in ngos.clone() {
        let claims = h.services.claims.clone();
        let id = donation_id.clone();
        handles.push(tokio::spawn(async move { (ngo.clone(), claims.claim(&ngo, &id).await) }));
    }

    let mut winners = Vec::new();
    let mut losers = 0;
    for handle in handles {
        let (ngo, res) = handle.await.unwrap();
        match res {
            Ok(c) => {
                assert_eq!(c.ngo_id, ngo.user_id);
                winners.push(c);
            }
            Err(Error::Claim(ClaimError::NotAvailable)) => losers += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(winners.len(), 1);
    assert_eq!(losers, 7);

    let db = h.services.store.connection();
    let rows = claim::Entity::find()
        .filter(claim::Column::DonationId.eq(&donation_id))
        .count(db)
        .await
        .unwrap();
    assert_eq!(rows, 1);

    let d = donation::Entity::find_by_id(donation_id.clone()).one(db).await.unwrap().unwrap();
    assert_eq!(d.status, DonationStatus::Claimed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn claim_races_on_a_pooled_store_report_not_available() {
    const CLAIMANTS: usize = 8;
    let h = pooled_harness(CLAIMANTS as u32).await;
    let donor = h.donor("dana@x.com").await;
    let mut ngos = Vec::new();
    for i in 0..CLAIMANTS {
        ngos.push(h.ngo(&format!("ngo{i}@x.com")).await);
    }

    for round in 0..10 {
        let donation_id = h.donation(&donor, &format!("batch {round}"), "Whitefield", now_ts()).await;
        let barrier = Arc::new(Barrier::new(CLAIMANTS));

        let mut handles = Vec::new();
        for ngo in ngos.clone() {
            let claims = h.services.claims.clone();
            let id = donation_id.clone();
            let barrier = barrier.clone();
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                claims.claim(&ngo, &id).await
            }));
        }

        let mut won = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => won += 1,
                Err(Error::Claim(ClaimError::NotAvailable)) => {}
                Err(other) => panic!("round {round}: loser saw {other:?}"),
            }
        }
        assert_eq!(won, 1, "round {round}");

        let rows = claim::Entity::find()
            .filter(claim::Column::DonationId.eq(&donation_id))
            .count(h.services.store.connection())
            .await
            .unwrap();
        assert_eq!(rows, 1, "round {round}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_status_updates_settle_once() {
    let h = pooled_harness(4).await;
    let donor = h.donor("dana@x.com").await;
    let ngo = h.ngo("ngo1@x.com").await;
    let id = h.donation(&donor, "rice", "Whitefield", now_ts()).await;
    let c = h.services.claims.claim(&ngo, &id).await.unwrap();
    let barrier = Arc::new(Barrier::new(4));

    let mut handles = Vec::new();
    for target in [
        DonationStatus::Delivered,
        DonationStatus::Cancelled,
        DonationStatus::Delivered,
        DonationStatus::Cancelled,
    ] {
        let claims = h.services.claims.clone();
        let (ngo, claim_id, barrier) = (ngo.clone(), c.id.clone(), barrier.clone());
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            claims.update_status(&ngo, &claim_id, target).await
        }));
    }

    let mut settled = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(updated) => settled.push(updated.status),
            Err(Error::Claim(ClaimError::InvalidTransition)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(settled.len(), 1);

    let view = h.services.claims.donation_view(&donor, &id).await.unwrap();
    assert_eq!(view.donation.status, settled[0]);
    assert_eq!(view.claim.map(|c| c.status), Some(settled[0]));
}

#[tokio::test]
async fn second_claim_sees_not_available() {
    let h = harness().await;
    let donor = h.donor("dana@x.com").await;
    let ngo1 = h.ngo("ngo1@x.com").await;
    let ngo2 = h.ngo("ngo2@x.com").await;
    let id = h.donation(&donor, "bread", "Indiranagar", now_ts()).await;

    let won = h.services.claims.claim(&ngo1, &id).await.unwrap();
    assert_eq!(won.status, DonationStatus::Claimed);
    assert_eq!(won.donation_id, id);

    let lost = h.services.claims.claim(&ngo2, &id).await.unwrap_err();
    assert!(matches!(lost, Error::Claim(ClaimError::NotAvailable)));

    // The winner cannot claim twice either.
    let again = h.services.claims.claim(&ngo1, &id).await.unwrap_err();
    assert!(matches!(again, Error::Claim(ClaimError::NotAvailable)));
}

#[tokio::test]
async fn claiming_missing_donation_is_not_found() {
    let h = harness().await;
    let ngo = h.ngo("ngo1@x.com").await;
    let err = h.services.claims.claim(&ngo, "does-not-exist").await.unwrap_err();
    assert!(matches!(err, Error::Claim(ClaimError::NotFound)));
}

#[tokio::test]
async fn only_ngos_claim_and_only_donors_submit() {
    let h = harness().await;
    let donor = h.donor("dana@x.com").await;
    let ngo = h.ngo("ngo1@x.com").await;
    let id = h.donation(&donor, "dal", "Whitefield", now_ts()).await;

    let err = h.services.claims.claim(&donor, &id).await.unwrap_err();
    assert!(matches!(err, Error::Forbidden { role: Role::Donor, .. }));

    let err = h
        .services
        .claims
        .submit_donation(
            &ngo,
            foodrescue_core::NewDonation {
                name: "x".to_string(),
                description: None,
                quantity: "1".to_string(),
                location: "y".to_string(),
                pickup_time: 0,
                image_url: None,
            },
        )
        .await
        .unwrap_err();
    assert!(err.is_forbidden());

    let d = donation::Entity::find_by_id(id).one(h.services.store.connection()).await.unwrap().unwrap();
    assert_eq!(d.status, DonationStatus::Pending);
}

#[tokio::test]
async fn non_owner_is_forbidden_for_every_target() {
    let h = harness().await;
    let donor = h.donor("dana@x.com").await;
    let owner = h.ngo("owner@x.com").await;
    let other = h.ngo("other@x.com").await;
    let id = h.donation(&donor, "rice", "Whitefield", now_ts()).await;
    let c = h.services.claims.claim(&owner, &id).await.unwrap();

    for target in [
        DonationStatus::Pending,
        DonationStatus::Claimed,
        DonationStatus::Delivered,
        DonationStatus::Cancelled,
    ] {
        let err = h
            .services
            .claims
            .update_status(&other, &c.id, target)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Claim(ClaimError::Forbidden)), "{target:?}: {err:?}");

        // The donor cannot move it either.
        let err = h
            .services
            .claims
            .update_status(&donor, &c.id, target)
            .await
            .unwrap_err();
        assert!(err.is_forbidden(), "{target:?}: {err:?}");
    }
}

#[tokio::test]
async fn delivery_mirrors_to_donation_and_is_terminal() {
    let h = harness().await;
    let donor = h.donor("dana@x.com").await;
    let ngo = h.ngo("ngo1@x.com").await;
    let id = h.donation(&donor, "rice", "Whitefield", now_ts()).await;
    let c = h.services.claims.claim(&ngo, &id).await.unwrap();

    let err = h
        .services
        .claims
        .update_status(&ngo, &c.id, DonationStatus::Pending)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Claim(ClaimError::InvalidTransition)));
    let err = h
        .services
        .claims
        .update_status(&ngo, &c.id, DonationStatus::Claimed)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Claim(ClaimError::InvalidTransition)));

    let done = h
        .services
        .claims
        .update_status(&ngo, &c.id, DonationStatus::Delivered)
        .await
        .unwrap();
    assert_eq!(done.status, DonationStatus::Delivered);

    let view = h.services.claims.donation_view(&donor, &id).await.unwrap();
    assert_eq!(view.donation.status, DonationStatus::Delivered);
    assert_eq!(view.claim.map(|c| c.status), Some(DonationStatus::Delivered));

    for target in [DonationStatus::Cancelled, DonationStatus::Delivered, DonationStatus::Pending] {
        let err = h
            .services
            .claims
            .update_status(&ngo, &c.id, target)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Claim(ClaimError::InvalidTransition)), "{target:?}");
    }
}

#[tokio::test]
async fn cancellation_keeps_the_claim_row() {
    let h = harness().await;
    let donor = h.donor("dana@x.com").await;
    let ngo = h.ngo("ngo1@x.com").await;
    let other = h.ngo("ngo2@x.com").await;
    let id = h.donation(&donor, "rice", "Whitefield", now_ts()).await;
    let c = h.services.claims.claim(&ngo, &id).await.unwrap();

    h.services
        .claims
        .update_status(&ngo, &c.id, DonationStatus::Cancelled)
        .await
        .unwrap();

    // A cancelled donation is terminal, not back in the pool.
    let err = h.services.claims.claim(&other, &id).await.unwrap_err();
    assert!(matches!(err, Error::Claim(ClaimError::NotAvailable)));
    assert!(h.services.claims.available(&other).await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_claim_is_not_found() {
    let h = harness().await;
    let ngo = h.ngo("ngo1@x.com").await;
    let err = h
        .services
        .claims
        .update_status(&ngo, "missing", DonationStatus::Delivered)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Claim(ClaimError::NotFound)));
}

#[tokio::test]
async fn listings_are_scoped_and_ordered() {
    let h = harness().await;
    let dana = h.donor("dana@x.com").await;
    let eve = h.donor("eve@x.com").await;
    let ngo = h.ngo("ngo1@x.com").await;
    let t = now_ts();

    let late = h.donation(&dana, "late", "Whitefield", t + 7200).await;
    let soon = h.donation(&dana, "soon", "Whitefield", t + 600).await;
    let eves = h.donation(&eve, "eve's", "Koramangala", t + 3600).await;

    let available: Vec<String> = h
        .services
        .claims
        .available(&ngo)
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.id)
        .collect();
    assert_eq!(available, vec![soon.clone(), eves.clone(), late.clone()]);

    h.services.claims.claim(&ngo, &soon).await.unwrap();
    let available = h.services.claims.available(&ngo).await.unwrap();
    assert_eq!(available.len(), 2);
    assert!(available.iter().all(|d| d.status == DonationStatus::Pending));

    let history = h.services.claims.donor_history(&dana).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|d| d.donor_id == dana.user_id));

    let claims = h.services.claims.ngo_history(&ngo).await.unwrap();
    assert_eq!(claims.len(), 1);
    assert_eq!(claims[0].donation_id, soon);

    assert!(h.services.claims.available(&dana).await.unwrap_err().is_forbidden());
    assert!(h.services.claims.donor_history(&ngo).await.unwrap_err().is_forbidden());
}

#[tokio::test]
async fn donation_view_is_limited_to_parties() {
    let h = harness().await;
    let dana = h.donor("dana@x.com").await;
    let eve = h.donor("eve@x.com").await;
    let ngo = h.ngo("ngo1@x.com").await;
    let stranger = h.ngo("ngo2@x.com").await;
    let id = h.donation(&dana, "rice", "Whitefield", now_ts()).await;

    let view = h.services.claims.donation_view(&dana, &id).await.unwrap();
    assert!(view.claim.is_none());

    h.services.claims.claim(&ngo, &id).await.unwrap();
    let view = h.services.claims.donation_view(&ngo, &id).await.unwrap();
    assert_eq!(view.claim.unwrap().ngo_id, ngo.user_id);

    for outsider in [&eve, &stranger] {
        let err = h.services.claims.donation_view(outsider, &id).await.unwrap_err();
        assert!(matches!(err, Error::Claim(ClaimError::Forbidden)));
    }

    let admin = Principal {
        user_id: "admin".to_string(),
        email: "root@x.com".to_string(),
        role: Role::Admin,
    };
    h.services.claims.donation_view(&admin, &id).await.unwrap();
}

#[tokio::test]
async fn analytics_counts_deliveries_and_top_locations() {
    let h = harness().await;
    let admin = Principal::from(&h.register("root@x.com", Role::Admin).await);
    let dana = h.donor("dana@x.com").await;
    let ngo = h.ngo("ngo1@x.com").await;
    let t = now_ts();

    for (name, loc) in [
        ("a", "Whitefield"),
        ("b", "Whitefield"),
        ("c", "Whitefield"),
        ("d", "Koramangala"),
        ("e", "Koramangala"),
        ("f", "Indiranagar"),
        ("g", "Jayanagar"),
    ] {
        let id = h.donation(&dana, name, loc, t).await;
        if name == "a" || name == "d" {
            let c = h.services.claims.claim(&ngo, &id).await.unwrap();
            h.services
                .claims
                .update_status(&ngo, &c.id, DonationStatus::Delivered)
                .await
                .unwrap();
        }
    }

    let stats = h.services.claims.analytics(&admin).await.unwrap();
    assert_eq!(stats.total_delivered, 2);
    let top: Vec<(&str, i64)> = stats
        .top_locations
        .iter()
        .map(|l| (l.location.as_str(), l.count))
        .collect();
    assert_eq!(
        top,
        vec![("Whitefield", 3), ("Koramangala", 2), ("Indiranagar", 1)]
    );

    assert!(h.services.claims.analytics(&dana).await.unwrap_err().is_forbidden());
}
