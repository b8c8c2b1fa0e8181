use std::marker::PhantomData;

use super::core::{ParseError, ParseResult, Parser};

impl<I, O> Parser<I, O> for Box<dyn Parser<I, O>> {
    fn parse(&self, input: &[I], pos: usize) -> ParseResult<O> {
        (**self).parse(input, pos)
    }
}

/// Consumes one token when `f` accepts it.
#[derive(Clone)]
pub struct Satisfy<I, O, F> {
    f: F,
    _phantom: PhantomData<fn(&I) -> O>,
}

impl<I, O, F> Satisfy<I, O, F>
where
    F: Fn(&I) -> Option<O>,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: PhantomData,
        }
    }
}

impl<I, O, F> Parser<I, O> for Satisfy<I, O, F>
where
    F: Fn(&I) -> Option<O>,
{
    fn parse(&self, input: &[I], pos: usize) -> ParseResult<O> {
        let token = input.get(pos).ok_or(ParseError::EOF { position: pos })?;
        match (self.f)(token) {
            Some(output) => Ok((pos + 1, output)),
            None => Err(ParseError::Mismatch { position: pos }),
        }
    }
}

/// Consumes one token equal to `value`.
#[derive(Clone)]
pub struct Equal<I> {
    value: I,
}

impl<I: PartialEq> Equal<I> {
    pub fn new(value: I) -> Self {
        Self { value }
    }
}

impl<I: PartialEq> Parser<I, ()> for Equal<I> {
    fn parse(&self, input: &[I], pos: usize) -> ParseResult<()> {
        match input.get(pos) {
            Some(token) if *token == self.value => Ok((pos + 1, ())),
            Some(_) => Err(ParseError::Mismatch { position: pos }),
            None => Err(ParseError::EOF { position: pos }),
        }
    }
}

/// Wraps a plain function as a parser.
#[derive(Clone)]
pub struct FromFn<F> {
    f: F,
}

impl<F> FromFn<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<I, O, F> Parser<I, O> for FromFn<F>
where
    F: Fn(&[I], usize) -> ParseResult<O>,
{
    fn parse(&self, input: &[I], pos: usize) -> ParseResult<O> {
        (self.f)(input, pos)
    }
}

pub struct Map<P, F, A> {
    parser: P,
    f: F,
    _phantom: PhantomData<fn() -> A>,
}

impl<P, F, A> Map<P, F, A> {
    pub fn new(parser: P, f: F) -> Self {
        Self {
            parser,
            f,
            _phantom: PhantomData,
        }
    }
}

impl<I, A, B, P, F> Parser<I, B> for Map<P, F, A>
where
    P: Parser<I, A>,
    F: Fn(A) -> B,
{
    fn parse(&self, input: &[I], pos: usize) -> ParseResult<B> {
        let (pos, output) = self.parser.parse(input, pos)?;
        Ok((pos, (self.f)(output)))
    }
}

/// Like [`Map`], but the mapping may reject the parsed value.
pub struct TryMap<P, F, A> {
    parser: P,
    f: F,
    _phantom: PhantomData<fn() -> A>,
}

impl<P, F, A> TryMap<P, F, A> {
    pub fn new(parser: P, f: F) -> Self {
        Self {
            parser,
            f,
            _phantom: PhantomData,
        }
    }
}

impl<I, A, B, P, F> Parser<I, B> for TryMap<P, F, A>
where
    P: Parser<I, A>,
    F: Fn(A) -> Result<B, String>,
{
    fn parse(&self, input: &[I], pos: usize) -> ParseResult<B> {
        let (next, output) = self.parser.parse(input, pos)?;
        match (self.f)(output) {
            Ok(mapped) => Ok((next, mapped)),
            Err(message) => Err(ParseError::Fail {
                message,
                position: pos,
            }),
        }
    }
}

/// Ordered choice. The first alternative that succeeds wins. On total failure
/// the error that reached furthest is returned.
pub struct Choice<I, O> {
    parsers: Vec<Box<dyn Parser<I, O>>>,
}

impl<I, O> Choice<I, O> {
    pub fn new(parsers: Vec<Box<dyn Parser<I, O>>>) -> Self {
        Self { parsers }
    }
}

impl<I, O> Parser<I, O> for Choice<I, O> {
    fn parse(&self, input: &[I], pos: usize) -> ParseResult<O> {
        let mut best: Option<ParseError> = None;
        for parser in &self.parsers {
            match parser.parse(input, pos) {
                Ok(result) => return Ok(result),
                Err(e) => {
                    best = Some(match best {
                        Some(previous) => previous.furthest(e),
                        None => e,
                    });
                }
            }
        }
        match best {
            Some(e) if e.position() > pos || e.message().is_some() => Err(e),
            _ => Err(ParseError::NoAlternative { position: pos }),
        }
    }
}

pub struct Optional<P, O> {
    parser: P,
    _phantom: PhantomData<fn() -> O>,
}

impl<P, O> Optional<P, O> {
    pub fn new(parser: P) -> Self {
        Self {
            parser,
            _phantom: PhantomData,
        }
    }
}

impl<I, O, P> Parser<I, Option<O>> for Optional<P, O>
where
    P: Parser<I, O>,
{
    fn parse(&self, input: &[I], pos: usize) -> ParseResult<Option<O>> {
        match self.parser.parse(input, pos) {
            Ok((pos, output)) => Ok((pos, Some(output))),
            Err(_) => Ok((pos, None)),
        }
    }
}

pub struct Many<P, O> {
    parser: P,
    _phantom: PhantomData<fn() -> O>,
}

impl<P, O> Many<P, O> {
    pub fn new(parser: P) -> Self {
        Self {
            parser,
            _phantom: PhantomData,
        }
    }
}

impl<I, O, P> Parser<I, Vec<O>> for Many<P, O>
where
    P: Parser<I, O>,
{
    fn parse(&self, input: &[I], mut pos: usize) -> ParseResult<Vec<O>> {
        let mut outputs = Vec::new();
        while let Ok((next, output)) = self.parser.parse(input, pos) {
            if next == pos {
                break;
            }
            outputs.push(output);
            pos = next;
        }
        Ok((pos, outputs))
    }
}

pub struct Many1<P, O> {
    parser: P,
    _phantom: PhantomData<fn() -> O>,
}

impl<P, O> Many1<P, O> {
    pub fn new(parser: P) -> Self {
        Self {
            parser,
            _phantom: PhantomData,
        }
    }
}

impl<I, O, P> Parser<I, Vec<O>> for Many1<P, O>
where
    P: Parser<I, O>,
{
    fn parse(&self, input: &[I], pos: usize) -> ParseResult<Vec<O>> {
        let (mut pos, first) = self.parser.parse(input, pos)?;
        let mut outputs = vec![first];
        while let Ok((next, output)) = self.parser.parse(input, pos) {
            if next == pos {
                break;
            }
            outputs.push(output);
            pos = next;
        }
        Ok((pos, outputs))
    }
}

/// `item (sep item)* sep?`. Yields the items and whether a trailing separator
/// was consumed, which is what tells `(x)` apart from `(x,)`.
pub struct SeparatedList<P, S, O> {
    item: P,
    separator: S,
    _phantom: PhantomData<fn() -> O>,
}

impl<P, S, O> SeparatedList<P, S, O> {
    pub fn new(item: P, separator: S) -> Self {
        Self {
            item,
            separator,
            _phantom: PhantomData,
        }
    }
}

impl<I, O, P, S> Parser<I, (Vec<O>, bool)> for SeparatedList<P, S, O>
where
    P: Parser<I, O>,
    S: Parser<I, ()>,
{
    fn parse(&self, input: &[I], pos: usize) -> ParseResult<(Vec<O>, bool)> {
        let mut items = Vec::new();
        let (mut pos, first) = match self.item.parse(input, pos) {
            Ok(result) => result,
            Err(_) => return Ok((pos, (items, false))),
        };
        items.push(first);
        loop {
            let Ok((after_separator, ())) = self.separator.parse(input, pos) else {
                return Ok((pos, (items, false)));
            };
            match self.item.parse(input, after_separator) {
                Ok((next, item)) => {
                    items.push(item);
                    pos = next;
                }
                Err(_) => return Ok((after_separator, (items, true))),
            }
        }
    }
}

pub struct Delimited<L, P, R> {
    left: L,
    parser: P,
    right: R,
}

impl<L, P, R> Delimited<L, P, R> {
    pub fn new(left: L, parser: P, right: R) -> Self {
        Self {
            left,
            parser,
            right,
        }
    }
}

impl<I, O, L, P, R> Parser<I, O> for Delimited<L, P, R>
where
    L: Parser<I, ()>,
    P: Parser<I, O>,
    R: Parser<I, ()>,
{
    fn parse(&self, input: &[I], pos: usize) -> ParseResult<O> {
        let (pos, ()) = self.left.parse(input, pos)?;
        let (pos, output) = self.parser.parse(input, pos)?;
        let (pos, ()) = self.right.parse(input, pos)?;
        Ok((pos, output))
    }
}

pub struct Preceded<P1, P2, O1> {
    first: P1,
    second: P2,
    _phantom: PhantomData<fn() -> O1>,
}

impl<P1, P2, O1> Preceded<P1, P2, O1> {
    pub fn new(first: P1, second: P2) -> Self {
        Self {
            first,
            second,
            _phantom: PhantomData,
        }
    }
}

impl<I, O1, O2, P1, P2> Parser<I, O2> for Preceded<P1, P2, O1>
where
    P1: Parser<I, O1>,
    P2: Parser<I, O2>,
{
    fn parse(&self, input: &[I], pos: usize) -> ParseResult<O2> {
        let (pos, _) = self.first.parse(input, pos)?;
        self.second.parse(input, pos)
    }
}

pub struct Terminated<P1, P2, O2> {
    first: P1,
    second: P2,
    _phantom: PhantomData<fn() -> O2>,
}

impl<P1, P2, O2> Terminated<P1, P2, O2> {
    pub fn new(first: P1, second: P2) -> Self {
        Self {
            first,
            second,
            _phantom: PhantomData,
        }
    }
}

impl<I, O1, O2, P1, P2> Parser<I, O1> for Terminated<P1, P2, O2>
where
    P1: Parser<I, O1>,
    P2: Parser<I, O2>,
{
    fn parse(&self, input: &[I], pos: usize) -> ParseResult<O1> {
        let (pos, output) = self.first.parse(input, pos)?;
        let (pos, _) = self.second.parse(input, pos)?;
        Ok((pos, output))
    }
}

pub struct Tuple2<P1, P2> {
    p1: P1,
    p2: P2,
}

impl<P1, P2> Tuple2<P1, P2> {
    pub fn new(p1: P1, p2: P2) -> Self {
        Self { p1, p2 }
    }
}

impl<I, O1, O2, P1, P2> Parser<I, (O1, O2)> for Tuple2<P1, P2>
where
    P1: Parser<I, O1>,
    P2: Parser<I, O2>,
{
    fn parse(&self, input: &[I], pos: usize) -> ParseResult<(O1, O2)> {
        let (pos, o1) = self.p1.parse(input, pos)?;
        let (pos, o2) = self.p2.parse(input, pos)?;
        Ok((pos, (o1, o2)))
    }
}

pub struct Tuple3<P1, P2, P3> {
    p1: P1,
    p2: P2,
    p3: P3,
}

impl<P1, P2, P3> Tuple3<P1, P2, P3> {
    pub fn new(p1: P1, p2: P2, p3: P3) -> Self {
        Self { p1, p2, p3 }
    }
}

impl<I, O1, O2, O3, P1, P2, P3> Parser<I, (O1, O2, O3)> for Tuple3<P1, P2, P3>
where
    P1: Parser<I, O1>,
    P2: Parser<I, O2>,
    P3: Parser<I, O3>,
{
    fn parse(&self, input: &[I], pos: usize) -> ParseResult<(O1, O2, O3)> {
        let (pos, o1) = self.p1.parse(input, pos)?;
        let (pos, o2) = self.p2.parse(input, pos)?;
        let (pos, o3) = self.p3.parse(input, pos)?;
        Ok((pos, (o1, o2, o3)))
    }
}

pub struct Tuple4<P1, P2, P3, P4> {
    p1: P1,
    p2: P2,
    p3: P3,
    p4: P4,
}

impl<P1, P2, P3, P4> Tuple4<P1, P2, P3, P4> {
    pub fn new(p1: P1, p2: P2, p3: P3, p4: P4) -> Self {
        Self { p1, p2, p3, p4 }
    }
}

impl<I, O1, O2, O3, O4, P1, P2, P3, P4> Parser<I, (O1, O2, O3, O4)> for Tuple4<P1, P2, P3, P4>
where
    P1: Parser<I, O1>,
    P2: Parser<I, O2>,
    P3: Parser<I, O3>,
    P4: Parser<I, O4>,
{
    fn parse(&self, input: &[I], pos: usize) -> ParseResult<(O1, O2, O3, O4)> {
        let (pos, o1) = self.p1.parse(input, pos)?;
        let (pos, o2) = self.p2.parse(input, pos)?;
        let (pos, o3) = self.p3.parse(input, pos)?;
        let (pos, o4) = self.p4.parse(input, pos)?;
        Ok((pos, (o1, o2, o3, o4)))
    }
}

pub struct WithContext<P> {
    parser: P,
    context: &'static str,
}

impl<P> WithContext<P> {
    pub fn new(parser: P, context: &'static str) -> Self {
        Self { parser, context }
    }
}

impl<I, O, P> Parser<I, O> for WithContext<P>
where
    P: Parser<I, O>,
{
    fn parse(&self, input: &[I], pos: usize) -> ParseResult<O> {
        self.parser
            .parse(input, pos)
            .map_err(|e| ParseError::WithContext {
                message: self.context.to_string(),
                inner: Box::new(e),
            })
    }
}

/// Defers construction of a parser until it runs. Needed for recursive grammars.
pub struct Lazy<F> {
    f: F,
}

impl<F> Lazy<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<I, O, F, P> Parser<I, O> for Lazy<F>
where
    F: Fn() -> P,
    P: Parser<I, O>,
{
    fn parse(&self, input: &[I], pos: usize) -> ParseResult<O> {
        (self.f)().parse(input, pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digit() -> Satisfy<char, u32, impl Fn(&char) -> Option<u32>> {
        Satisfy::new(|c: &char| c.to_digit(10))
    }

    #[test]
    fn test_satisfy() {
        let input = ['1', 'x'];
        assert_eq!(digit().parse(&input, 0), Ok((1, 1)));
        assert_eq!(
            digit().parse(&input, 1),
            Err(ParseError::Mismatch { position: 1 })
        );
        assert_eq!(digit().parse(&input, 2), Err(ParseError::EOF { position: 2 }));
    }

    #[test]
    fn test_choice_reports_furthest_failure() {
        let input = ['(', '1', '+'];
        let paren_digit: Box<dyn Parser<char, u32>> = Box::new(Preceded::new(
            Equal::new('('),
            Terminated::new(digit(), Equal::new(')')),
        ));
        let bare_digit: Box<dyn Parser<char, u32>> = Box::new(digit());
        let choice = Choice::new(vec![paren_digit, bare_digit]);
        assert_eq!(
            choice.parse(&input, 0),
            Err(ParseError::Mismatch { position: 2 })
        );
        assert_eq!(choice.parse(&input, 1), Ok((2, 1)));
    }

    #[test]
    fn test_choice_without_progress() {
        let input = ['x'];
        let choice: Choice<char, u32> = Choice::new(vec![Box::new(digit())]);
        assert_eq!(
            choice.parse(&input, 0),
            Err(ParseError::NoAlternative { position: 0 })
        );
    }

    #[test]
    fn test_separated_list_trailing() {
        let list = SeparatedList::new(digit(), Equal::new(','));
        assert_eq!(list.parse(&['1', ',', '2'], 0), Ok((3, (vec![1, 2], false))));
        assert_eq!(list.parse(&['1', ','], 0), Ok((2, (vec![1], true))));
        assert_eq!(list.parse(&['x'], 0), Ok((0, (vec![], false))));
    }

    #[test]
    fn test_many_and_many1() {
        let input = ['1', '2', 'x'];
        assert_eq!(Many::new(digit()).parse(&input, 0), Ok((2, vec![1, 2])));
        assert_eq!(Many::new(digit()).parse(&input, 2), Ok((2, vec![])));
        assert!(Many1::new(digit()).parse(&input, 2).is_err());
    }

    #[test]
    fn test_try_map_failure_position() {
        let even = TryMap::new(digit(), |n: u32| {
            if n % 2 == 0 {
                Ok(n)
            } else {
                Err(format!("{} is odd", n))
            }
        });
        assert_eq!(even.parse(&['4'], 0), Ok((1, 4)));
        assert_eq!(
            even.parse(&['7'], 0),
            Err(ParseError::Fail {
                message: "7 is odd".to_string(),
                position: 0
            })
        );
    }

    #[test]
    fn test_delimited_and_tuple() {
        let input = ['[', '3', ']', '4'];
        let bracketed = Delimited::new(Equal::new('['), digit(), Equal::new(']'));
        let pair = Tuple2::new(bracketed, digit());
        assert_eq!(pair.parse(&input, 0), Ok((4, (3, 4))));
    }

    #[test]
    fn test_optional() {
        let parser = Optional::new(digit());
        assert_eq!(parser.parse(&['5'], 0), Ok((1, Some(5))));
        assert_eq!(parser.parse(&['x'], 0), Ok((0, None)));
    }
}
