use super::combinators::*;
use super::core::{ParseResult, Parser};

pub fn satisfy<I, O, F>(f: F) -> Satisfy<I, O, F>
where
    F: Fn(&I) -> Option<O>,
{
    Satisfy::new(f)
}

pub fn equal<I: PartialEq>(value: I) -> Equal<I> {
    Equal::new(value)
}

pub fn from_fn<I, O, F>(f: F) -> FromFn<F>
where
    F: Fn(&[I], usize) -> ParseResult<O>,
{
    FromFn::new(f)
}

pub fn map<P, F, A, B, I>(parser: P, f: F) -> Map<P, F, A>
where
    P: Parser<I, A>,
    F: Fn(A) -> B,
{
    Map::new(parser, f)
}

pub fn try_map<P, F, A, B, I>(parser: P, f: F) -> TryMap<P, F, A>
where
    P: Parser<I, A>,
    F: Fn(A) -> Result<B, String>,
{
    TryMap::new(parser, f)
}

pub fn choice<I, O>(parsers: Vec<Box<dyn Parser<I, O>>>) -> Choice<I, O> {
    Choice::new(parsers)
}

pub fn optional<P, I, O>(parser: P) -> Optional<P, O>
where
    P: Parser<I, O>,
{
    Optional::new(parser)
}

pub fn many<P, I, O>(parser: P) -> Many<P, O>
where
    P: Parser<I, O>,
{
    Many::new(parser)
}

pub fn many1<P, I, O>(parser: P) -> Many1<P, O>
where
    P: Parser<I, O>,
{
    Many1::new(parser)
}

pub fn separated_list<P, S, I, O>(item: P, separator: S) -> SeparatedList<P, S, O>
where
    P: Parser<I, O>,
    S: Parser<I, ()>,
{
    SeparatedList::new(item, separator)
}

pub fn delimited<L, P, R, I, O>(left: L, parser: P, right: R) -> Delimited<L, P, R>
where
    L: Parser<I, ()>,
    P: Parser<I, O>,
    R: Parser<I, ()>,
{
    Delimited::new(left, parser, right)
}

pub fn preceded<P1, P2, I, O1, O2>(first: P1, second: P2) -> Preceded<P1, P2, O1>
where
    P1: Parser<I, O1>,
    P2: Parser<I, O2>,
{
    Preceded::new(first, second)
}

pub fn terminated<P1, P2, I, O1, O2>(first: P1, second: P2) -> Terminated<P1, P2, O2>
where
    P1: Parser<I, O1>,
    P2: Parser<I, O2>,
{
    Terminated::new(first, second)
}

pub fn tuple2<P1, P2, I, O1, O2>(p1: P1, p2: P2) -> Tuple2<P1, P2>
where
    P1: Parser<I, O1>,
    P2: Parser<I, O2>,
{
    Tuple2::new(p1, p2)
}

pub fn tuple3<P1, P2, P3, I, O1, O2, O3>(p1: P1, p2: P2, p3: P3) -> Tuple3<P1, P2, P3>
where
    P1: Parser<I, O1>,
    P2: Parser<I, O2>,
    P3: Parser<I, O3>,
{
    Tuple3::new(p1, p2, p3)
}

pub fn tuple4<P1, P2, P3, P4, I, O1, O2, O3, O4>(
    p1: P1,
    p2: P2,
    p3: P3,
    p4: P4,
) -> Tuple4<P1, P2, P3, P4>
where
    P1: Parser<I, O1>,
    P2: Parser<I, O2>,
    P3: Parser<I, O3>,
    P4: Parser<I, O4>,
{
    Tuple4::new(p1, p2, p3, p4)
}

pub fn with_context<P, I, O>(parser: P, context: &'static str) -> WithContext<P>
where
    P: Parser<I, O>,
{
    WithContext::new(parser, context)
}

pub fn lazy<I, O, F, P>(f: F) -> Lazy<F>
where
    F: Fn() -> P,
    P: Parser<I, O>,
{
    Lazy::new(f)
}
