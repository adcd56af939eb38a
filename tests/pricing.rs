mod common;

use common::{minswap_pool_record, TOKEN};
use dexter_pools_rs::dex::minswap::Minswap;
use dexter_pools_rs::pricing::{constant_product, AnnPolicy, Pricing, StableSwapParams, VolumeFee};
use dexter_pools_rs::{AssetBag, PoolState, PricingError, LOVELACE};

const ADDRESS: &str = "addr1w8snz7c4974vzdpxu65ruphl3zjdvtxw8strf2c2tmqnxzgusf9xw";

fn pool() -> PoolState {
    PoolState::build(&Minswap, minswap_pool_record(ADDRESS, 0)).unwrap()
}

#[test]
fn test_minswap_regression_vector() {
    let quote = pool().get_amount_out(&AssetBag::lovelace(1_000_000)).unwrap();
    let expected =
        1_000_000i128 * 9970 * 500_000_000 / (1_000_000 * 9970 + 1_000_000_000_000 * 10000);
    assert_eq!(quote.quantity(), expected);
    assert_eq!(quote.quantity(), 498);
    assert_eq!(quote.assets.unit(0).unwrap(), TOKEN);
    assert!(quote.price_impact > 0.0 && quote.price_impact < 0.01);
}

#[test]
fn test_round_trip_never_gains() {
    let pool = pool();
    for x in [1_000_000i128, 7_777_777, 50_000_000_000, 999_999_999_999] {
        let out = pool.get_amount_out(&AssetBag::lovelace(x)).unwrap();
        let back = pool
            .get_amount_in(&AssetBag::single(TOKEN, out.quantity()))
            .unwrap();
        assert_eq!(back.assets.unit(0).unwrap(), LOVELACE);
        assert!(back.quantity() <= x, "paid {} for an output bought with {}", back.quantity(), x);
    }
}

#[test]
fn test_swap_grows_product() {
    let pool = pool();
    let (ra, rb) = (pool.reserve_a(), pool.reserve_b());
    for x in [1i128, 1_000, 1_000_000, 123_456_789_000, 10_000_000_000_000] {
        let y = pool.get_amount_out(&AssetBag::lovelace(x)).unwrap().quantity();
        assert!((ra + x) * (rb - y) >= ra * rb);
    }
    for x in [1i128, 10_000, 499_999_999] {
        let y = pool.get_amount_out(&AssetBag::single(TOKEN, x)).unwrap().quantity();
        assert!((ra - y) * (rb + x) >= ra * rb);
    }
}

#[test]
fn test_dust_input_quotes_zero() {
    let quote = pool().get_amount_out(&AssetBag::lovelace(1)).unwrap();
    assert_eq!(quote.quantity(), 0);
    assert_eq!(quote.price_impact, 0.0);
}

#[test]
fn test_quote_rejects_foreign_or_multiple_units() {
    let pool = pool();
    let foreign = AssetBag::single("ff".repeat(29), 10);
    assert!(matches!(
        pool.get_amount_out(&foreign),
        Err(PricingError::UnitNotInPool { .. })
    ));
    let two = AssetBag::from_pairs([(LOVELACE, 1), (TOKEN, 1)]).unwrap();
    assert_eq!(pool.get_amount_out(&two), Err(PricingError::AssetCount(2)));
    assert!(matches!(
        pool.get_amount_in(&AssetBag::single(TOKEN, 500_000_000)),
        Err(PricingError::InsufficientLiquidity { .. })
    ));
}

#[test]
fn test_amount_in_covers_requested_output() {
    let (paid, _) = constant_product::amount_in(1_000, 2_000_000, 1_000_000, 30).unwrap();
    let (received, _) = constant_product::amount_out(paid + 1, 2_000_000, 1_000_000, 30);
    assert!(received >= 1_000);
}

#[test]
fn test_full_fee_quotes_fail_instead_of_dividing_by_zero() {
    let mut pool = pool();
    pool.fee = VolumeFee::Flat(10_000);
    assert_eq!(
        pool.get_amount_in(&AssetBag::single(TOKEN, 1_000)),
        Err(PricingError::InvalidFee(10_000))
    );
    assert_eq!(pool.get_amount_out(&AssetBag::lovelace(1_000_000)).unwrap().quantity(), 0);
}

#[test]
fn test_zero_amp_quotes_fail() {
    let mut pool = pool();
    pool.pricing = Pricing::StableSwap(StableSwapParams {
        amp: 0,
        ann: AnnPolicy::Linear,
        multipliers: [1, 1],
        fee_on_input: false,
    });
    assert_eq!(
        pool.get_amount_out(&AssetBag::lovelace(1_000_000)),
        Err(PricingError::InvalidAmplification(0))
    );
    assert_eq!(
        pool.get_amount_in(&AssetBag::single(TOKEN, 1_000)),
        Err(PricingError::InvalidAmplification(0))
    );
}

#[test]
fn test_stable_invariant_converges_for_realistic_reserves() {
    for ann in [AnnPolicy::Exponent, AnnPolicy::Linear] {
        let params = StableSwapParams {
            amp: 75,
            ann,
            multipliers: [1, 1],
            fee_on_input: false,
        };
        for reserves in [
            [1_000_000i128, 1_000_000],
            [1_000_000, 1_000_000_000_000],
            [1_000_000_000_000, 3_000_000],
            [654_321_000_000, 987_654_000_000],
        ] {
            let solution = params.invariant(reserves);
            assert!(solution.converged, "no convergence for {:?}", reserves);
            assert!(solution.iterations < 256);
        }
    }
}

#[test]
fn test_stable_balanced_pool_trades_near_par() {
    let params = StableSwapParams {
        amp: 75,
        ann: AnnPolicy::Exponent,
        multipliers: [1, 1],
        fee_on_input: false,
    };
    let reserves = [1_000_000_000_000, 1_000_000_000_000];
    let out = params.amount_out(reserves, true, 1_000_000, 0).unwrap();
    assert!(out <= 1_000_000);
    assert!(out >= 999_990);
}

#[test]
fn test_stable_fee_leg_changes_result() {
    let reserves = [2_000_000_000, 1_500_000_000];
    let on_output = StableSwapParams {
        amp: 75,
        ann: AnnPolicy::Exponent,
        multipliers: [1, 1],
        fee_on_input: false,
    };
    let on_input = StableSwapParams {
        fee_on_input: true,
        ..on_output
    };
    let a = on_output.amount_out(reserves, true, 100_000_000, 30).unwrap();
    let b = on_input.amount_out(reserves, true, 100_000_000, 30).unwrap();
    let no_fee = on_output.amount_out(reserves, true, 100_000_000, 0).unwrap();
    assert!(a < no_fee);
    assert!(b < no_fee);
}

#[test]
fn test_stable_multipliers_scale_reserves() {
    // 6 decimals against 8 decimals
    let params = StableSwapParams {
        amp: 75,
        ann: AnnPolicy::Exponent,
        multipliers: [100, 1],
        fee_on_input: false,
    };
    let reserves = [1_000_000_000_000, 100_000_000_000_000];
    let out = params.amount_out(reserves, true, 1_000_000, 0).unwrap();
    assert!(out <= 100_000_000);
    assert!(out >= 99_999_000);
}
