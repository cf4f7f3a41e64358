//! Program indicator statements as produced by the analytics SQL generator.

use analytics_cte_rewriter::config::OptimizerConfig;
use analytics_cte_rewriter::cte_optimizer::PatternKind;
use analytics_cte_rewriter::{optimize, CteOptimizer, DialectFlags};
use std::borrow::Cow;

use super::{last_value_cte, normalize_sql};

fn assert_rewritten(original: &str, expected: &str) {
    let rewritten = optimize(original);
    assert!(
        matches!(rewritten, Cow::Owned(_)),
        "expected a rewrite of:\n{}",
        original
    );
    assert_eq!(
        normalize_sql(&rewritten),
        normalize_sql(expected),
        "rewritten SQL:\n{}",
        rewritten
    );
}

const SCHEDULED_UR1: &str = "(
    select   scheduleddate
    from     analytics_event_ur1edk5oe2n
    where    analytics_event_ur1edk5oe2n.enrollment = subax.enrollment
    and      scheduleddate IS NOT NULL
    order by occurreddate DESC
    limit    1 )";

const CREATED_UR1: &str = "(
    select   created
    from     analytics_event_ur1edk5oe2n
    where    analytics_event_ur1edk5oe2n.enrollment = subax.enrollment
    and      created IS NOT NULL
    order by occurreddate DESC
    limit    1 )";

#[test]
fn test_last_scheduled_and_created() {
    let original = format!(
        r#"with pi_hgtnuhsqbml as (
  select
    enrollment,
    sum(1+1) as value
   from
      analytics_enrollment_ur1edk5oe2n as subax
   where
      ((
       date_part('year', age(cast(
      {sched} as date),
      cast(coalesce(completeddate,
      {created}) as date)))) * 12 ) > 1
      and "lw1SqmMlnfh" is not null
   group by
      enrollment )
   -- end of CTE
   select
      ax.enrollment
   from
      analytics_enrollment_ur1edk5oe2n as ax
   where
      (((
      lastupdated >= '2018-01-01' and lastupdated < '2018-04-28')))
      and ( ax."uidlevel1" = 'ImspTQPwCqd' )
"#,
        sched = SCHEDULED_UR1,
        created = CREATED_UR1
    );

    let expected = format!(
        r#"with {last_sched},
{last_created},
pi_hgtnuhsqbml as (
  select subax.enrollment, sum(1+1) as value
  from analytics_enrollment_ur1edk5oe2n as subax
  left join last_sched as ls on subax.enrollment = ls.enrollment
  left join last_created as lc on subax.enrollment = lc.enrollment
  where ((date_part('year', age(cast(ls.scheduleddate as date),
      cast(coalesce(completeddate, lc.created) as date)))) * 12 ) > 1
    and "lw1SqmMlnfh" is not null
  group by subax.enrollment )
select ax.enrollment
from analytics_enrollment_ur1edk5oe2n as ax
where (((lastupdated >= '2018-01-01' and lastupdated < '2018-04-28')))
  and ( ax."uidlevel1" = 'ImspTQPwCqd' )
"#,
        last_sched = last_value_cte(
            "last_sched",
            "analytics_event_ur1edk5oe2n",
            "scheduleddate",
            &[]
        ),
        last_created = last_value_cte(
            "last_created",
            "analytics_event_ur1edk5oe2n",
            "created",
            &[]
        ),
    );

    assert_rewritten(&original, &expected);
}

#[test]
fn test_last_created_in_where() {
    let original = format!(
        r#"with pi_inputcte AS (
    select subax.enrollment
    from analytics_enrollment_ur1edk5oe2n AS subax
    where {created} IS NOT NULL
)
select * from pi_inputcte;
"#,
        created = CREATED_UR1
    );
    let expected = format!(
        r#"with {last_created},
pi_inputcte AS (
    select subax.enrollment
    from analytics_enrollment_ur1edk5oe2n AS subax
    left join last_created as lc on subax.enrollment = lc.enrollment
    where lc.created IS NOT NULL
)
select * from pi_inputcte;
"#,
        last_created = last_value_cte(
            "last_created",
            "analytics_event_ur1edk5oe2n",
            "created",
            &[]
        ),
    );

    assert_rewritten(&original, &expected);
}

const AGGREGATED_RELATIONSHIP: &str = r#"with pi_inputcte AS (
    select subax.enrollment
    from analytics_enrollment_ur1edk5oe2n AS subax
    where (
        (select
            sum(relationship_count)
        from
            analytics_rs_relationship arr
        where
            arr.trackedentityid = subax.trackedentity) > 10
    )
)
select * from analytics_enrollment_ur1edk5oe2n;
"#;

#[test]
fn test_aggregated_relationship_count() {
    let expected = r#"with relationship_count_agg as (
    select trackedentityid, sum(relationship_count) as relationship_count
    from analytics_rs_relationship
    group by trackedentityid
),
pi_inputcte AS (
    select subax.enrollment
    from analytics_enrollment_ur1edk5oe2n AS subax
    left join relationship_count_agg as rlc on subax.trackedentity = rlc.trackedentityid
    where (
        rlc.relationship_count > 10
    )
)
select * from analytics_enrollment_ur1edk5oe2n;
"#;

    assert_rewritten(AGGREGATED_RELATIONSHIP, expected);
}

#[test]
fn test_relationship_count_disabled_stays_verbatim() {
    let config = OptimizerConfig {
        patterns: PatternKind::ALL
            .into_iter()
            .filter(|kind| *kind != PatternKind::RelationshipCount)
            .collect(),
        ..Default::default()
    };
    let optimizer = CteOptimizer::new(config);
    let result = optimizer.optimize(AGGREGATED_RELATIONSHIP, DialectFlags::default());
    assert!(matches!(result, Cow::Borrowed(s) if s == AGGREGATED_RELATIONSHIP));
}

#[test]
fn test_non_aggregated_relationship_count() {
    let original = r#"with pi_inputcte AS (
    select subax.enrollment
    from analytics_enrollment_ur1edk5oe2n AS subax
    where (
        (select relationship_count
         from analytics_rs_relationship arr
         where arr.trackedentityid = subax.trackedentity
         and relationshiptypeuid = 'dk34dj3') > 10
    )
)
select * from analytics_enrollment_ur1edk5oe2n;
"#;
    let expected = r#"with relationship_count as (
    select trackedentityid, relationship_count
    from analytics_rs_relationship
    where relationshiptypeuid = 'dk34dj3'
),
pi_inputcte AS (
    select subax.enrollment
    from analytics_enrollment_ur1edk5oe2n AS subax
    left join relationship_count as rlc on subax.trackedentity = rlc.trackedentityid
    where (
        rlc.relationship_count > 10
    )
)
select * from analytics_enrollment_ur1edk5oe2n;
"#;

    assert_rewritten(original, expected);
}

#[test]
fn test_repeated_lookups_share_one_join() {
    let original = format!(
        r#"with pi_hgtnuhsqbml AS (
    select
        enrollment
    from analytics_enrollment_ur1edk5oe2n AS subax
    where ((
        date_part('year',age(cast({sched} AS date), cast(coalesce(completeddate,
            {created}) AS date)))) * 12 + date_part('month',age(cast({sched} AS date),
            cast(coalesce(completeddate, {created}) AS date)))) > 1
    GROUP BY enrollment
)
select
    ax.enrollment
from analytics_enrollment_ur1edk5oe2n AS ax
left join pi_hgtnuhsqbml kektm ON kektm.enrollment = ax.enrollment
where (lastupdated >= '2015-01-01' and lastupdated < '2025-01-01')
and ax."uidlevel1" = 'ImspTQPwCqd'
limit 101
OFFSET 0
"#,
        sched = SCHEDULED_UR1,
        created = CREATED_UR1
    );
    let expected = format!(
        r#"with {last_sched},
{last_created},
pi_hgtnuhsqbml AS (
    select subax.enrollment
    from analytics_enrollment_ur1edk5oe2n AS subax
    left join last_sched as ls on subax.enrollment = ls.enrollment
    left join last_created as lc on subax.enrollment = lc.enrollment
    where ((
        date_part('year',age(cast(ls.scheduleddate AS date), cast(coalesce(completeddate,
            lc.created) AS date)))) * 12 + date_part('month',age(cast(ls.scheduleddate AS date),
            cast(coalesce(completeddate, lc.created) AS date)))) > 1
    GROUP BY subax.enrollment
)
select ax.enrollment
from analytics_enrollment_ur1edk5oe2n AS ax
left join pi_hgtnuhsqbml kektm ON kektm.enrollment = ax.enrollment
where (lastupdated >= '2015-01-01' and lastupdated < '2025-01-01')
and ax."uidlevel1" = 'ImspTQPwCqd'
limit 101
OFFSET 0
"#,
        last_sched = last_value_cte(
            "last_sched",
            "analytics_event_ur1edk5oe2n",
            "scheduleddate",
            &[]
        ),
        last_created = last_value_cte(
            "last_created",
            "analytics_event_ur1edk5oe2n",
            "created",
            &[]
        ),
    );

    let rewritten = optimize(&original);
    assert_eq!(rewritten.matches("left join last_sched").count(), 1);
    assert_eq!(rewritten.matches("ls.scheduleddate").count(), 2);
    assert_eq!(rewritten.matches("lc.created").count(), 2);
    assert_rewritten(&original, &expected);
}

#[test]
fn test_stage_filtered_values() {
    let lookup = |column: &str, stage: &str| {
        format!(
            r#"(
    select
        {column}
    from
        analytics_event_IpHINAT79UW
    where
        analytics_event_IpHINAT79UW.enrollment = subax.enrollment
        and {column} is not null
        and ps = '{stage}'
    order by
        occurreddate desc
    limit 1 )"#
        )
    };
    let h6u = lookup("\"H6uSAMO5WLD\"", "A03MvHHogjR");
    let cyg = lookup("\"cYGaxwK615G\"", "ZzYYXq4fJie");
    let created = r#"(
    select
        created
    from
        analytics_event_IpHINAT79UW
    where
        analytics_event_IpHINAT79UW.enrollment = subax.enrollment
        and created is not null
    order by
        occurreddate desc
    limit 1 )"#;

    let original = format!(
        r#"with pi_qZOBw051LSf as (
select
    enrollment,
    sum(1+1) as value
from
    analytics_enrollment_iphinat79uw as subax
where
    (date_part('year',
    age(cast(enrollmentdate as date),
    cast({created} as date)))) >= 5
    and (date_part('year',
    age(cast(enrollmentdate as date),
    cast(completeddate as date)))) < 1
    and coalesce("cejWyOfXge6"::text,
    '') = 'MALE'
    and (coalesce({h6u}::text,
    '') = 'RDT'
    or "w75KJ2mc4zz" is not null)
    and (coalesce({cyg}::text,
    '') = 'POSITIVE'
    or coalesce({cyg}::text,
    '') = 'NEGATIVE')
    or not (3.14 = 0)
    or '2015-01-01' is not null
group by
    enrollment )
select
    ax.enrollment,
    coalesce(tmwkc.value,
    0) as qZOBw051LSf
from
    analytics_enrollment_iphinat79uw as ax
left join pi_qZOBw051LSf tmwkc on
    tmwkc.enrollment = ax.enrollment
where
    (((lastupdated >= '2015-01-01'
        and lastupdated < '2025-01-01')))
    and (ax."uidlevel1" = 'ImspTQPwCqd' )
    and enrollmentstatus in ('COMPLETED')
order by
    "lastupdated" desc nulls last
limit 101 offset 0
"#
    );

    let expected = format!(
        r#"with {last_created},
{last_h6u},
{last_cyg},
pi_qZOBw051LSf as (
select
    subax.enrollment,
    sum(1+1) as value
from
    analytics_enrollment_iphinat79uw as subax
left join last_created as lc on subax.enrollment = lc.enrollment
left join last_value_h6usamo5wld as lv_H6uSAMO5WLD on subax.enrollment = lv_H6uSAMO5WLD.enrollment
left join last_value_cygaxwk615g as lv_cYGaxwK615G on subax.enrollment = lv_cYGaxwK615G.enrollment
where
    (date_part('year',
    age(cast(enrollmentdate as date),
    cast(lc.created as date)))) >= 5
    and (date_part('year',
    age(cast(enrollmentdate as date),
    cast(completeddate as date)))) < 1
    and coalesce("cejWyOfXge6"::text,
    '') = 'MALE'
    and (coalesce(lv_H6uSAMO5WLD."H6uSAMO5WLD"::text,
    '') = 'RDT'
    or "w75KJ2mc4zz" is not null)
    and (coalesce(lv_cYGaxwK615G."cYGaxwK615G"::text,
    '') = 'POSITIVE'
    or coalesce(lv_cYGaxwK615G."cYGaxwK615G"::text,
    '') = 'NEGATIVE')
    or not (3.14 = 0)
    or '2015-01-01' is not null
group by
    subax.enrollment )
select
    ax.enrollment,
    coalesce(tmwkc.value,
    0) as qZOBw051LSf
from
    analytics_enrollment_iphinat79uw as ax
left join pi_qZOBw051LSf tmwkc on
    tmwkc.enrollment = ax.enrollment
where
    (((lastupdated >= '2015-01-01'
        and lastupdated < '2025-01-01')))
    and (ax."uidlevel1" = 'ImspTQPwCqd' )
    and enrollmentstatus in ('COMPLETED')
order by
    "lastupdated" desc nulls last
limit 101 offset 0
"#,
        last_created = last_value_cte(
            "last_created",
            "analytics_event_IpHINAT79UW",
            "created",
            &[]
        ),
        last_h6u = last_value_cte(
            "last_value_h6usamo5wld",
            "analytics_event_IpHINAT79UW",
            "\"H6uSAMO5WLD\"",
            &["ps = 'A03MvHHogjR'"]
        ),
        last_cyg = last_value_cte(
            "last_value_cygaxwk615g",
            "analytics_event_IpHINAT79UW",
            "\"cYGaxwK615G\"",
            &["ps = 'ZzYYXq4fJie'"]
        ),
    );

    assert_rewritten(&original, &expected);
}

#[test]
fn test_counts_and_relationships_with_lookups() {
    let sched = r#"(
    select
        scheduleddate
    from
        analytics_event_ur1Edk5Oe2n
    where
        analytics_event_ur1Edk5Oe2n.enrollment = subax.enrollment
        and scheduleddate is not null
    order by
        occurreddate desc
    limit 1 )"#;
    let created = r#"(
    select
        created
    from
        analytics_event_ur1Edk5Oe2n
    where
        analytics_event_ur1Edk5Oe2n.enrollment = subax.enrollment
        and created is not null
    order by
        occurreddate desc
    limit 1 )"#;

    let original = format!(
        r#"with pi_hgTNuHSqBmL as (
select
    enrollment,
    sum(1+1) as value
from
    analytics_enrollment_ur1edk5oe2n as subax
where
    ((date_part('year',
    age(cast({sched} as date),
    cast(coalesce(completeddate,
    {created}) as date)))) * 12 + date_part('month',
    age(cast({sched} as date),
    cast(coalesce(completeddate,
    {created}) as date)))) > 1
    or nullif(cast((case
        when "OvY4VVhSDeJ" >= 0 then 1
        else 0
    end) as double precision),
    0) > 2
    or not ((
    select
        count("fCXKBdc27Bt")
    from
        analytics_event_ur1Edk5Oe2n
    where
        analytics_event_ur1Edk5Oe2n.enrollment = subax.enrollment
        and "fCXKBdc27Bt" is not null
        and "fCXKBdc27Bt" = 1
        and ps = 'EPEcjy3FWmI') > 0)
    and (extract(epoch
from
    (cast(completeddate as timestamp) - cast(enrollmentdate as timestamp))) / 60) > 1
    and ("cejWyOfXge6" is not null)
    and (
    select
        sum(relationship_count)
    from
        analytics_rs_relationship arr
    where
        arr.trackedentityid = subax.trackedentity) > 0
    and "lw1SqmMlnfh" is not null
group by
    enrollment )
select
    ax.enrollment,
    coalesce(nvtqi.value,
    0) as hgTNuHSqBmL
from
    analytics_enrollment_ur1edk5oe2n as ax
left join pi_hgTNuHSqBmL nvtqi on
    nvtqi.enrollment = ax.enrollment
where
    (((lastupdated >= '2015-01-01'
        and lastupdated < '2025-01-01')))
    and (ax."uidlevel1" = 'ImspTQPwCqd' )
    and nvtqi.value > 404
    and nvtqi.value is not null
order by
    hgTNuHSqBmL asc nulls last
limit 101 offset 0
"#
    );

    let expected = format!(
        r#"with {last_sched},
{last_created},
de_count_fcxkbdc27bt as (
    select enrollment, count("fCXKBdc27Bt") as de_count
    from analytics_event_ur1Edk5Oe2n
    where "fCXKBdc27Bt" is not null
        and "fCXKBdc27Bt" = 1
        and ps = 'EPEcjy3FWmI'
    group by enrollment
),
relationship_count_agg as (
    select trackedentityid, sum(relationship_count) as relationship_count
    from analytics_rs_relationship
    group by trackedentityid
),
pi_hgTNuHSqBmL as (
select
    subax.enrollment,
    sum(1+1) as value
from
    analytics_enrollment_ur1edk5oe2n as subax
left join last_sched as ls on subax.enrollment = ls.enrollment
left join last_created as lc on subax.enrollment = lc.enrollment
left join de_count_fcxkbdc27bt as dec_decount on subax.enrollment = dec_decount.enrollment
left join relationship_count_agg as rlc on subax.trackedentity = rlc.trackedentityid
where
    ((date_part('year',
    age(cast(ls.scheduleddate as date),
    cast(coalesce(completeddate,
    lc.created) as date)))) * 12 + date_part('month',
    age(cast(ls.scheduleddate as date),
    cast(coalesce(completeddate,
    lc.created) as date)))) > 1
    or nullif(cast((case
        when "OvY4VVhSDeJ" >= 0 then 1
        else 0
    end) as double precision),
    0) > 2
    or not (coalesce(dec_decount.de_count, 0) > 0)
    and (extract(epoch
from
    (cast(completeddate as timestamp) - cast(enrollmentdate as timestamp))) / 60) > 1
    and ("cejWyOfXge6" is not null)
    and rlc.relationship_count > 0
    and "lw1SqmMlnfh" is not null
group by
    subax.enrollment )
select
    ax.enrollment,
    coalesce(nvtqi.value,
    0) as hgTNuHSqBmL
from
    analytics_enrollment_ur1edk5oe2n as ax
left join pi_hgTNuHSqBmL nvtqi on
    nvtqi.enrollment = ax.enrollment
where
    (((lastupdated >= '2015-01-01'
        and lastupdated < '2025-01-01')))
    and (ax."uidlevel1" = 'ImspTQPwCqd' )
    and nvtqi.value > 404
    and nvtqi.value is not null
order by
    hgTNuHSqBmL asc nulls last
limit 101 offset 0
"#,
        last_sched = last_value_cte(
            "last_sched",
            "analytics_event_ur1Edk5Oe2n",
            "scheduleddate",
            &[]
        ),
        last_created = last_value_cte(
            "last_created",
            "analytics_event_ur1Edk5Oe2n",
            "created",
            &[]
        ),
    );

    assert_rewritten(&original, &expected);
}

#[test]
fn test_geometry_lookup_needs_spatial_support() {
    let original = r#"select subax.enrollment
from analytics_enrollment_x as subax
where (select geometry from analytics_event_x
       where analytics_event_x.enrollment = subax.enrollment and geometry is not null
       order by occurreddate desc limit 1) is not null"#;

    let optimizer = CteOptimizer::default();
    assert!(matches!(
        optimizer.optimize(original, DialectFlags::default()),
        Cow::Borrowed(_)
    ));

    let spatial = optimizer.optimize(original, DialectFlags::with_spatial_support(true));
    assert!(spatial.contains("left join last_value_geometry as lv_geometry on subax.enrollment = lv_geometry.enrollment"));
    assert!(spatial.contains("where lv_geometry.geometry is not null"));
}
