//! LSTM sequence models
//!
//! A network reads one `(seq_len, n_features)` window per sample and emits one
//! value: the probability that the label is 1, or with
//! [`RecurrentObjective::Regression`] a continuous prediction such as the next
//! close. Six architectures share the same building blocks:
//!
//! | name          | front end | recurrent stack           | head            |
//! |---------------|-----------|---------------------------|-----------------|
//! | `lstm1`       |           | 1 LSTM                    | sigmoid         |
//! | `lstm2`       |           | 2 stacked LSTM            | sigmoid         |
//! | `lstm3`       |           | 3 stacked LSTM            | sigmoid         |
//! | `lstmhao2020` |           | 1 LSTM                    | relu + sigmoid  |
//! | `bilstm`      |           | 1 bidirectional LSTM      | sigmoid         |
//! | `cnnbilstm`   | conv1d    | 1 bidirectional LSTM      | sigmoid         |
//!
//! Regression replaces the sigmoid by a linear unit trained with squared error
//! on standardized targets.
//!
//! Training is full backpropagation through time with Adam. Per-sample
//! gradients of a batch are computed in parallel and summed in sample order,
//! so a seeded run is reproducible.

use super::neural_network::sigmoid;
use super::{Standardizer, TrainingHistory};
use crate::error::{Result, TrendlabError};
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView3, Axis, Zip};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Network layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrentArchitecture {
    Lstm1,
    Lstm2,
    Lstm3,
    LstmHao2020,
    BiLstm,
    CnnBiLstm,
}

struct Layout {
    conv: bool,
    lstm_layers: usize,
    bidirectional: bool,
    dense_hidden: bool,
}

impl RecurrentArchitecture {
    pub const ALL: [RecurrentArchitecture; 6] = [
        RecurrentArchitecture::Lstm1,
        RecurrentArchitecture::Lstm2,
        RecurrentArchitecture::Lstm3,
        RecurrentArchitecture::LstmHao2020,
        RecurrentArchitecture::BiLstm,
        RecurrentArchitecture::CnnBiLstm,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            RecurrentArchitecture::Lstm1 => "lstm1",
            RecurrentArchitecture::Lstm2 => "lstm2",
            RecurrentArchitecture::Lstm3 => "lstm3",
            RecurrentArchitecture::LstmHao2020 => "lstmhao2020",
            RecurrentArchitecture::BiLstm => "bilstm",
            RecurrentArchitecture::CnnBiLstm => "cnnbilstm",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.name() == name)
    }

    fn layout(&self) -> Layout {
        let (conv, lstm_layers, bidirectional, dense_hidden) = match self {
            RecurrentArchitecture::Lstm1 => (false, 1, false, false),
            RecurrentArchitecture::Lstm2 => (false, 2, false, false),
            RecurrentArchitecture::Lstm3 => (false, 3, false, false),
            RecurrentArchitecture::LstmHao2020 => (false, 1, false, true),
            RecurrentArchitecture::BiLstm => (false, 1, true, false),
            RecurrentArchitecture::CnnBiLstm => (true, 1, true, false),
        };
        Layout {
            conv,
            lstm_layers,
            bidirectional,
            dense_hidden,
        }
    }
}

/// What the output unit is trained to predict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrentObjective {
    /// Sigmoid output, log loss on 0/1 labels
    #[default]
    Classification,
    /// Linear output, squared error on standardized targets
    Regression,
}

impl RecurrentObjective {
    /// Loss and its derivative with respect to the raw output `z`
    fn loss(&self, z: f64, y: f64) -> (f64, f64) {
        match self {
            RecurrentObjective::Classification => {
                let p = sigmoid(z);
                let q = p.clamp(1e-12, 1.0 - 1e-12);
                (-(y * q.ln() + (1.0 - y) * (1.0 - q).ln()), p - y)
            }
            RecurrentObjective::Regression => (0.5 * (z - y).powi(2), z - y),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurrentConfig {
    pub architecture: RecurrentArchitecture,
    #[serde(default)]
    pub objective: RecurrentObjective,
    pub hidden_size: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub batch_size: usize,
    /// Trailing steps of each window fed to the network; the whole window when `None`
    pub seq_len: Option<usize>,
    pub conv_filters: usize,
    pub kernel_size: usize,
    /// Global gradient norm limit
    pub clip_norm: f64,
    pub random_state: Option<u64>,
}

impl Default for RecurrentConfig {
    fn default() -> Self {
        Self {
            architecture: RecurrentArchitecture::Lstm1,
            objective: RecurrentObjective::Classification,
            hidden_size: 16,
            epochs: 20,
            learning_rate: 0.01,
            batch_size: 32,
            seq_len: None,
            conv_filters: 8,
            kernel_size: 3,
            clip_norm: 5.0,
            random_state: None,
        }
    }
}

impl RecurrentConfig {
    pub fn new(architecture: RecurrentArchitecture) -> Self {
        Self {
            architecture,
            ..Self::default()
        }
    }

    pub fn with_objective(mut self, objective: RecurrentObjective) -> Self {
        self.objective = objective;
        self
    }

    pub fn with_hidden_size(mut self, size: usize) -> Self {
        self.hidden_size = size;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_seq_len(mut self, seq_len: Option<usize>) -> Self {
        self.seq_len = seq_len;
        self
    }

    pub fn with_random_state(mut self, seed: Option<u64>) -> Self {
        self.random_state = seed;
        self
    }
}

fn uniform(shape: (usize, usize), limit: f64, rng: &mut Xoshiro256PlusPlus) -> Array2<f64> {
    Array2::from_shape_fn(shape, |_| rng.gen_range(-limit..limit))
}

fn outer(a: &Array1<f64>, b: ArrayView1<f64>) -> Array2<f64> {
    a.view().insert_axis(Axis(1)).dot(&b.insert_axis(Axis(0)))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Dense {
    /// `(n_out, n_in)`
    w: Array2<f64>,
    /// `(n_out, 1)`
    b: Array2<f64>,
}

impl Dense {
    fn new(n_in: usize, n_out: usize, rng: &mut Xoshiro256PlusPlus) -> Self {
        let limit = (6.0 / (n_in + n_out) as f64).sqrt();
        Self {
            w: uniform((n_out, n_in), limit, rng),
            b: Array2::zeros((n_out, 1)),
        }
    }

    fn forward(&self, x: &Array1<f64>) -> Array1<f64> {
        self.w.dot(x) + &self.b.column(0)
    }

    fn backward(&self, x: &Array1<f64>, dz: &Array1<f64>, grads: &mut [Array2<f64>]) -> Array1<f64> {
        grads[0] += &outer(dz, x.view());
        grads[1].column_mut(0).scaled_add(1.0, dz);
        self.w.t().dot(dz)
    }

    fn params(&self) -> Vec<&Array2<f64>> {
        vec![&self.w, &self.b]
    }

    fn params_mut(&mut self) -> Vec<&mut Array2<f64>> {
        vec![&mut self.w, &mut self.b]
    }
}

/// Causal 1-D convolution with ReLU; output step `t` sees steps `t-k+1..=t`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Conv1d {
    kernel: usize,
    n_in: usize,
    /// `(filters, kernel * n_in)`
    w: Array2<f64>,
    b: Array2<f64>,
}

struct ConvTrace {
    patches: Vec<Array1<f64>>,
    pre: Vec<Array1<f64>>,
}

impl Conv1d {
    fn new(n_in: usize, filters: usize, kernel: usize, rng: &mut Xoshiro256PlusPlus) -> Self {
        let fan_in = kernel * n_in;
        let limit = (6.0 / (fan_in + filters) as f64).sqrt();
        Self {
            kernel,
            n_in,
            w: uniform((filters, fan_in), limit, rng),
            b: Array2::zeros((filters, 1)),
        }
    }

    /// Source row of tap `k` at step `t`, `None` inside the zero padding
    fn source(&self, t: usize, k: usize) -> Option<usize> {
        (t + k + 1).checked_sub(self.kernel)
    }

    fn forward(&self, x: &Array2<f64>) -> (Array2<f64>, ConvTrace) {
        let steps = x.nrows();
        let mut out = Array2::zeros((steps, self.w.nrows()));
        let mut trace = ConvTrace {
            patches: Vec::with_capacity(steps),
            pre: Vec::with_capacity(steps),
        };
        for t in 0..steps {
            let mut patch = Array1::zeros(self.kernel * self.n_in);
            for k in 0..self.kernel {
                if let Some(src) = self.source(t, k) {
                    patch
                        .slice_mut(s![k * self.n_in..(k + 1) * self.n_in])
                        .assign(&x.row(src));
                }
            }
            let z = self.w.dot(&patch) + &self.b.column(0);
            out.row_mut(t).assign(&z.mapv(|v| v.max(0.0)));
            trace.patches.push(patch);
            trace.pre.push(z);
        }
        (out, trace)
    }

    fn backward(&self, trace: &ConvTrace, d_out: &Array2<f64>, grads: &mut [Array2<f64>]) -> Array2<f64> {
        let mut dx = Array2::zeros((d_out.nrows(), self.n_in));
        for (t, (patch, z)) in trace.patches.iter().zip(&trace.pre).enumerate() {
            let dz: Array1<f64> = d_out
                .row(t)
                .iter()
                .zip(z.iter())
                .map(|(&d, &zi)| if zi > 0.0 { d } else { 0.0 })
                .collect();
            grads[0] += &outer(&dz, patch.view());
            grads[1].column_mut(0).scaled_add(1.0, &dz);
            let d_patch = self.w.t().dot(&dz);
            for k in 0..self.kernel {
                if let Some(src) = self.source(t, k) {
                    dx.row_mut(src)
                        .scaled_add(1.0, &d_patch.slice(s![k * self.n_in..(k + 1) * self.n_in]));
                }
            }
        }
        dx
    }

    fn params(&self) -> Vec<&Array2<f64>> {
        vec![&self.w, &self.b]
    }

    fn params_mut(&mut self) -> Vec<&mut Array2<f64>> {
        vec![&mut self.w, &mut self.b]
    }
}

/// One LSTM direction. Gates are stacked `[input, forget, cell, output]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Lstm {
    hidden: usize,
    reverse: bool,
    /// `(4h, n_in)`
    w: Array2<f64>,
    /// `(4h, h)`
    u: Array2<f64>,
    /// `(4h, 1)`
    b: Array2<f64>,
}

struct LstmStep {
    x: Array1<f64>,
    h_prev: Array1<f64>,
    c_prev: Array1<f64>,
    i: Array1<f64>,
    f: Array1<f64>,
    g: Array1<f64>,
    o: Array1<f64>,
    tanh_c: Array1<f64>,
}

impl Lstm {
    fn new(n_in: usize, hidden: usize, reverse: bool, rng: &mut Xoshiro256PlusPlus) -> Self {
        let limit = (1.0 / hidden as f64).sqrt();
        let mut b = Array2::zeros((4 * hidden, 1));
        // forget gate starts open
        b.slice_mut(s![hidden..2 * hidden, ..]).fill(1.0);
        Self {
            hidden,
            reverse,
            w: uniform((4 * hidden, n_in), limit, rng),
            u: uniform((4 * hidden, hidden), limit, rng),
            b,
        }
    }

    fn order(&self, steps: usize) -> Vec<usize> {
        if self.reverse {
            (0..steps).rev().collect()
        } else {
            (0..steps).collect()
        }
    }

    fn forward(&self, x: &Array2<f64>) -> (Array2<f64>, Vec<LstmStep>) {
        let h = self.hidden;
        let mut out = Array2::zeros((x.nrows(), h));
        let mut trace = Vec::with_capacity(x.nrows());
        let mut h_prev = Array1::zeros(h);
        let mut c_prev = Array1::zeros(h);

        for t in self.order(x.nrows()) {
            let xt = x.row(t).to_owned();
            let z = self.w.dot(&xt) + self.u.dot(&h_prev) + &self.b.column(0);
            let i = z.slice(s![0..h]).mapv(sigmoid);
            let f = z.slice(s![h..2 * h]).mapv(sigmoid);
            let g = z.slice(s![2 * h..3 * h]).mapv(f64::tanh);
            let o = z.slice(s![3 * h..4 * h]).mapv(sigmoid);

            let c = &f * &c_prev + &i * &g;
            let tanh_c = c.mapv(f64::tanh);
            let h_t = &o * &tanh_c;
            out.row_mut(t).assign(&h_t);

            trace.push(LstmStep {
                x: xt,
                h_prev,
                c_prev,
                i,
                f,
                g,
                o,
                tanh_c,
            });
            h_prev = h_t;
            c_prev = c;
        }
        (out, trace)
    }

    fn backward(&self, trace: &[LstmStep], d_out: &Array2<f64>, grads: &mut [Array2<f64>]) -> Array2<f64> {
        let h = self.hidden;
        let order = self.order(d_out.nrows());
        let mut dx = Array2::zeros((d_out.nrows(), self.w.ncols()));
        let mut dh_next: Array1<f64> = Array1::zeros(h);
        let mut dc_next: Array1<f64> = Array1::zeros(h);

        for (k, step) in trace.iter().enumerate().rev() {
            let t = order[k];
            let dh = &d_out.row(t) + &dh_next;
            let d_o = &dh * &step.tanh_c;
            let dc = &dh * &step.o * &step.tanh_c.mapv(|v| 1.0 - v * v) + &dc_next;
            let d_i = &dc * &step.g;
            let d_g = &dc * &step.i;
            let d_f = &dc * &step.c_prev;
            dc_next = &dc * &step.f;

            let mut dz = Array1::zeros(4 * h);
            dz.slice_mut(s![0..h])
                .assign(&(&d_i * &step.i * &step.i.mapv(|v| 1.0 - v)));
            dz.slice_mut(s![h..2 * h])
                .assign(&(&d_f * &step.f * &step.f.mapv(|v| 1.0 - v)));
            dz.slice_mut(s![2 * h..3 * h])
                .assign(&(&d_g * &step.g.mapv(|v| 1.0 - v * v)));
            dz.slice_mut(s![3 * h..4 * h])
                .assign(&(&d_o * &step.o * &step.o.mapv(|v| 1.0 - v)));

            grads[0] += &outer(&dz, step.x.view());
            grads[1] += &outer(&dz, step.h_prev.view());
            grads[2].column_mut(0).scaled_add(1.0, &dz);
            dx.row_mut(t).assign(&self.w.t().dot(&dz));
            dh_next = self.u.t().dot(&dz);
        }
        dx
    }

    fn params(&self) -> Vec<&Array2<f64>> {
        vec![&self.w, &self.u, &self.b]
    }

    fn params_mut(&mut self) -> Vec<&mut Array2<f64>> {
        vec![&mut self.w, &mut self.u, &mut self.b]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum SequenceLayer {
    Forward(Lstm),
    Bidirectional(Lstm, Lstm),
}

enum LayerTrace {
    Forward(Vec<LstmStep>),
    Bidirectional(Vec<LstmStep>, Vec<LstmStep>),
}

impl SequenceLayer {
    fn hidden(&self) -> usize {
        match self {
            SequenceLayer::Forward(l) | SequenceLayer::Bidirectional(l, _) => l.hidden,
        }
    }

    fn output_size(&self) -> usize {
        match self {
            SequenceLayer::Forward(l) => l.hidden,
            SequenceLayer::Bidirectional(f, b) => f.hidden + b.hidden,
        }
    }

    fn n_params(&self) -> usize {
        match self {
            SequenceLayer::Forward(_) => 3,
            SequenceLayer::Bidirectional(..) => 6,
        }
    }

    fn forward(&self, x: &Array2<f64>) -> (Array2<f64>, LayerTrace) {
        match self {
            SequenceLayer::Forward(l) => {
                let (out, trace) = l.forward(x);
                (out, LayerTrace::Forward(trace))
            }
            SequenceLayer::Bidirectional(fwd, bwd) => {
                let (out_f, trace_f) = fwd.forward(x);
                let (out_b, trace_b) = bwd.forward(x);
                let mut out = Array2::zeros((x.nrows(), self.output_size()));
                out.slice_mut(s![.., ..fwd.hidden]).assign(&out_f);
                out.slice_mut(s![.., fwd.hidden..]).assign(&out_b);
                (out, LayerTrace::Bidirectional(trace_f, trace_b))
            }
        }
    }

    fn backward(&self, trace: &LayerTrace, d_out: &Array2<f64>, grads: &mut [Array2<f64>]) -> Array2<f64> {
        match (self, trace) {
            (SequenceLayer::Forward(l), LayerTrace::Forward(t)) => l.backward(t, d_out, grads),
            (SequenceLayer::Bidirectional(fwd, bwd), LayerTrace::Bidirectional(tf, tb)) => {
                let (g_f, g_b) = grads.split_at_mut(3);
                let d_f = d_out.slice(s![.., ..fwd.hidden]).to_owned();
                let d_b = d_out.slice(s![.., fwd.hidden..]).to_owned();
                fwd.backward(tf, &d_f, g_f) + bwd.backward(tb, &d_b, g_b)
            }
            // traces are produced by the same layer
            _ => Array2::zeros((d_out.nrows(), 0)),
        }
    }

    /// Summary vector read by the head: the last forward state, plus the
    /// first-step state of the reverse direction
    fn summary(&self, out: &Array2<f64>) -> Array1<f64> {
        let last = out.nrows() - 1;
        match self {
            SequenceLayer::Forward(_) => out.row(last).to_owned(),
            SequenceLayer::Bidirectional(fwd, _) => {
                let mut v = out.row(last).to_owned();
                v.slice_mut(s![fwd.hidden..]).assign(&out.slice(s![0, fwd.hidden..]));
                v
            }
        }
    }

    fn summary_grad(&self, d_summary: &Array1<f64>, steps: usize) -> Array2<f64> {
        let mut d_out = Array2::zeros((steps, self.output_size()));
        match self {
            SequenceLayer::Forward(_) => d_out.row_mut(steps - 1).assign(d_summary),
            SequenceLayer::Bidirectional(fwd, _) => {
                let h = fwd.hidden;
                d_out.slice_mut(s![steps - 1, ..h]).assign(&d_summary.slice(s![..h]));
                d_out.slice_mut(s![0, h..]).assign(&d_summary.slice(s![h..]));
            }
        }
        d_out
    }

    fn params(&self) -> Vec<&Array2<f64>> {
        match self {
            SequenceLayer::Forward(l) => l.params(),
            SequenceLayer::Bidirectional(f, b) => f.params().into_iter().chain(b.params()).collect(),
        }
    }

    fn params_mut(&mut self) -> Vec<&mut Array2<f64>> {
        match self {
            SequenceLayer::Forward(l) => l.params_mut(),
            SequenceLayer::Bidirectional(f, b) => {
                f.params_mut().into_iter().chain(b.params_mut()).collect()
            }
        }
    }
}

/// Adam optimizer state, one moment pair per parameter matrix
struct Adam {
    lr: f64,
    beta1: f64,
    beta2: f64,
    eps: f64,
    t: i32,
    m: Vec<Array2<f64>>,
    v: Vec<Array2<f64>>,
}

impl Adam {
    fn new(shapes: &[Array2<f64>], lr: f64) -> Self {
        Self {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            t: 0,
            m: shapes.to_vec(),
            v: shapes.to_vec(),
        }
    }

    fn step(&mut self, params: Vec<&mut Array2<f64>>, grads: &[Array2<f64>]) {
        self.t += 1;
        let (b1, b2, lr, eps) = (self.beta1, self.beta2, self.lr, self.eps);
        let bc1 = 1.0 - b1.powi(self.t);
        let bc2 = 1.0 - b2.powi(self.t);
        for ((p, g), (m, v)) in params
            .into_iter()
            .zip(grads)
            .zip(self.m.iter_mut().zip(self.v.iter_mut()))
        {
            m.zip_mut_with(g, |m, &g| *m = b1 * *m + (1.0 - b1) * g);
            v.zip_mut_with(g, |v, &g| *v = b2 * *v + (1.0 - b2) * g * g);
            Zip::from(p).and(&*m).and(&*v).for_each(|p, &m, &v| {
                *p -= lr * (m / bc1) / ((v / bc2).sqrt() + eps);
            });
        }
    }
}

/// Mean and std used to standardize regression targets
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct TargetScale {
    mean: f64,
    std: f64,
}

/// Recurrent network over sequence windows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurrentNetwork {
    config: RecurrentConfig,
    scaler: Option<Standardizer>,
    target_scale: Option<TargetScale>,
    conv: Option<Conv1d>,
    layers: Vec<SequenceLayer>,
    hidden: Option<Dense>,
    output: Option<Dense>,
    history: TrainingHistory,
}

impl RecurrentNetwork {
    pub fn new(config: RecurrentConfig) -> Self {
        Self {
            config,
            scaler: None,
            target_scale: None,
            conv: None,
            layers: Vec::new(),
            hidden: None,
            output: None,
            history: TrainingHistory::default(),
        }
    }

    pub fn config(&self) -> &RecurrentConfig {
        &self.config
    }

    pub fn architecture(&self) -> RecurrentArchitecture {
        self.config.architecture
    }

    pub fn objective(&self) -> RecurrentObjective {
        self.config.objective
    }

    pub fn history(&self) -> &TrainingHistory {
        &self.history
    }

    fn build(&mut self, n_features: usize, rng: &mut Xoshiro256PlusPlus) {
        let layout = self.config.architecture.layout();
        let h = self.config.hidden_size;
        let mut width = n_features;

        self.conv = if layout.conv {
            let conv = Conv1d::new(width, self.config.conv_filters, self.config.kernel_size, rng);
            width = self.config.conv_filters;
            Some(conv)
        } else {
            None
        };

        self.layers.clear();
        for _ in 0..layout.lstm_layers {
            let layer = if layout.bidirectional {
                SequenceLayer::Bidirectional(Lstm::new(width, h, false, rng), Lstm::new(width, h, true, rng))
            } else {
                SequenceLayer::Forward(Lstm::new(width, h, false, rng))
            };
            width = layer.output_size();
            self.layers.push(layer);
        }

        self.hidden = if layout.dense_hidden {
            let dense = Dense::new(width, h, rng);
            width = h;
            Some(dense)
        } else {
            None
        };
        self.output = Some(Dense::new(width, 1, rng));
    }

    fn params(&self) -> Vec<&Array2<f64>> {
        let mut params = Vec::new();
        if let Some(conv) = &self.conv {
            params.extend(conv.params());
        }
        for layer in &self.layers {
            params.extend(layer.params());
        }
        if let Some(hidden) = &self.hidden {
            params.extend(hidden.params());
        }
        if let Some(output) = &self.output {
            params.extend(output.params());
        }
        params
    }

    fn params_mut(&mut self) -> Vec<&mut Array2<f64>> {
        let mut params = Vec::new();
        if let Some(conv) = &mut self.conv {
            params.extend(conv.params_mut());
        }
        for layer in &mut self.layers {
            params.extend(layer.params_mut());
        }
        if let Some(hidden) = &mut self.hidden {
            params.extend(hidden.params_mut());
        }
        if let Some(output) = &mut self.output {
            params.extend(output.params_mut());
        }
        params
    }

    fn zero_grads(&self) -> Vec<Array2<f64>> {
        self.params().into_iter().map(|p| Array2::zeros(p.raw_dim())).collect()
    }

    /// Raw output unit for one standardized window
    fn predict_sample(&self, x: &Array2<f64>) -> Result<f64> {
        let output = self.output.as_ref().ok_or(TrendlabError::NotFitted)?;
        let mut seq = match &self.conv {
            Some(conv) => conv.forward(x).0,
            None => x.clone(),
        };
        for layer in &self.layers {
            seq = layer.forward(&seq).0;
        }
        let mut v = match self.layers.last() {
            Some(layer) => layer.summary(&seq),
            None => return Err(TrendlabError::NotFitted),
        };
        if let Some(hidden) = &self.hidden {
            v = hidden.forward(&v).mapv(|a| a.max(0.0));
        }
        Ok(output.forward(&v)[0])
    }

    /// Loss and parameter gradients for one standardized window
    fn sample_gradients(&self, x: &Array2<f64>, y: f64) -> Result<(f64, Vec<Array2<f64>>)> {
        let output = self.output.as_ref().ok_or(TrendlabError::NotFitted)?;
        let last = self.layers.last().ok_or(TrendlabError::NotFitted)?;
        let steps = x.nrows();

        let (conv_out, conv_trace) = match &self.conv {
            Some(conv) => {
                let (out, trace) = conv.forward(x);
                (out, Some(trace))
            }
            None => (x.clone(), None),
        };
        let mut inputs = vec![conv_out];
        let mut traces = Vec::with_capacity(self.layers.len());
        for (k, layer) in self.layers.iter().enumerate() {
            let (out, trace) = layer.forward(&inputs[k]);
            inputs.push(out);
            traces.push(trace);
        }

        let summary = last.summary(&inputs[self.layers.len()]);
        let (head_in, hidden_pre) = match &self.hidden {
            Some(hidden) => {
                let pre = hidden.forward(&summary);
                (pre.mapv(|a| a.max(0.0)), Some(pre))
            }
            None => (summary.clone(), None),
        };
        let (loss, d_out) = self.config.objective.loss(output.forward(&head_in)[0], y);

        let mut grads = self.zero_grads();
        let conv_len = if self.conv.is_some() { 2 } else { 0 };
        let hidden_len = if self.hidden.is_some() { 2 } else { 0 };
        let (g_conv, rest) = grads.split_at_mut(conv_len);
        let mut rest = rest;
        let mut g_layers = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let (g, r) = std::mem::take(&mut rest).split_at_mut(layer.n_params());
            g_layers.push(g);
            rest = r;
        }
        let (g_hidden, g_output) = rest.split_at_mut(hidden_len);

        let d_logit = Array1::from_elem(1, d_out);
        let mut d_head = output.backward(&head_in, &d_logit, g_output);
        if let (Some(hidden), Some(pre)) = (&self.hidden, &hidden_pre) {
            let d_pre: Array1<f64> = d_head
                .iter()
                .zip(pre.iter())
                .map(|(&d, &z)| if z > 0.0 { d } else { 0.0 })
                .collect();
            d_head = hidden.backward(&summary, &d_pre, g_hidden);
        }

        let mut d_seq = last.summary_grad(&d_head, steps);
        for (k, layer) in self.layers.iter().enumerate().rev() {
            d_seq = layer.backward(&traces[k], &d_seq, g_layers[k]);
        }
        if let (Some(conv), Some(trace)) = (&self.conv, &conv_trace) {
            conv.backward(trace, &d_seq, g_conv);
        }

        Ok((loss, grads))
    }

    fn prepare(&self, windows: ArrayView3<f64>, scaler: &Standardizer) -> Vec<Array2<f64>> {
        let steps = windows.shape()[1];
        let keep = self.config.seq_len.map_or(steps, |k| k.clamp(1, steps));
        windows
            .axis_iter(Axis(0))
            .map(|w| scaler.transform(w.slice(s![steps - keep.., ..])))
            .collect()
    }

    /// Train on `(n, seq_len, n_features)` windows. Classification expects
    /// 0/1 labels; regression accepts any finite target.
    pub fn fit(&mut self, windows: ArrayView3<f64>, y: ArrayView1<f64>) -> Result<()> {
        let (n, steps, n_features) = windows.dim();
        if n == 0 || n != y.len() {
            return Err(TrendlabError::TrainingError(format!("{} windows against {} labels", n, y.len())));
        }
        if steps == 0 || n_features == 0 {
            return Err(TrendlabError::ShapeError {
                expected: "non-empty windows".to_string(),
                actual: format!("({}, {}, {})", n, steps, n_features),
            });
        }
        if self.config.hidden_size == 0 || self.config.epochs == 0 {
            return Err(TrendlabError::invalid_parameter(
                "hidden_size/epochs",
                format!("{}/{}", self.config.hidden_size, self.config.epochs),
                "must both be at least 1",
            ));
        }
        if let Some(k) = self.config.seq_len {
            if k > steps {
                debug!(seq_len = k, available = steps, "Windows shorter than requested seq_len");
            }
        }
        let (y, target_scale) = match self.config.objective {
            RecurrentObjective::Classification => {
                if y.iter().any(|&v| v != 0.0 && v != 1.0) {
                    return Err(TrendlabError::InvalidInput(
                        "recurrent classifiers expect 0/1 labels".to_string(),
                    ));
                }
                (y.to_owned(), None)
            }
            RecurrentObjective::Regression => {
                if y.iter().any(|v| !v.is_finite()) {
                    return Err(TrendlabError::InvalidInput("regression targets must be finite".to_string()));
                }
                let mean = y.mean().unwrap_or(0.0);
                let std = y.std(0.0);
                let std = if std > 1e-12 { std } else { 1.0 };
                (y.mapv(|v| (v - mean) / std), Some(TargetScale { mean, std }))
            }
        };

        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };
        // the last step of every window is the sample's own row
        let scaler = Standardizer::fit(windows.index_axis(Axis(1), steps - 1));
        let samples = self.prepare(windows, &scaler);
        self.scaler = Some(scaler);
        self.target_scale = target_scale;
        self.build(n_features, &mut rng);
        self.history = TrainingHistory::default();

        let mut adam = Adam::new(&self.zero_grads(), self.config.learning_rate);
        let batch_size = self.config.batch_size.max(1);
        let mut order: Vec<usize> = (0..n).collect();

        for epoch in 0..self.config.epochs {
            order.shuffle(&mut rng);
            let mut epoch_loss = 0.0;
            for batch in order.chunks(batch_size) {
                let results: Vec<(f64, Vec<Array2<f64>>)> = batch
                    .par_iter()
                    .map(|&i| self.sample_gradients(&samples[i], y[i]))
                    .collect::<Result<_>>()?;

                let mut grads = self.zero_grads();
                for (loss, sample_grads) in results {
                    epoch_loss += loss;
                    for (acc, g) in grads.iter_mut().zip(sample_grads) {
                        *acc += &g;
                    }
                }
                let scale = 1.0 / batch.len() as f64;
                let norm = grads.iter().map(|g| g.iter().map(|v| v * v).sum::<f64>()).sum::<f64>().sqrt() * scale;
                let factor = if norm > self.config.clip_norm { scale * self.config.clip_norm / norm } else { scale };
                grads.iter_mut().for_each(|g| *g *= factor);

                adam.step(self.params_mut(), &grads);
            }

            let loss = epoch_loss / n as f64;
            if !loss.is_finite() {
                return Err(TrendlabError::TrainingError(format!("loss diverged at epoch {}", epoch)));
            }
            self.history.push(loss);
            debug!(architecture = self.config.architecture.name(), epoch, loss, "Recurrent epoch");
        }
        Ok(())
    }

    fn predict_raw(&self, windows: ArrayView3<f64>) -> Result<Array1<f64>> {
        let scaler = self.scaler.as_ref().ok_or(TrendlabError::NotFitted)?;
        let samples = self.prepare(windows, scaler);
        let raw: Vec<f64> = samples
            .par_iter()
            .map(|x| self.predict_sample(x))
            .collect::<Result<_>>()?;
        Ok(Array1::from_vec(raw))
    }

    /// Positive-class probability per window
    pub fn predict_proba(&self, windows: ArrayView3<f64>) -> Result<Array1<f64>> {
        if self.config.objective != RecurrentObjective::Classification {
            return Err(TrendlabError::InvalidInput(
                "a regression network predicts values, not probabilities".to_string(),
            ));
        }
        Ok(self.predict_raw(windows)?.mapv(sigmoid))
    }

    /// Predicted target per window, in the units of the training targets
    pub fn predict_values(&self, windows: ArrayView3<f64>) -> Result<Array1<f64>> {
        if self.config.objective != RecurrentObjective::Regression {
            return Err(TrendlabError::InvalidInput(
                "a classification network predicts probabilities, not values".to_string(),
            ));
        }
        let scale = self.target_scale.ok_or(TrendlabError::NotFitted)?;
        Ok(self.predict_raw(windows)?.mapv(|z| z * scale.std + scale.mean))
    }

    /// Hidden width of the recurrent stack
    pub fn hidden_size(&self) -> usize {
        self.layers.first().map_or(self.config.hidden_size, |l| l.hidden())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    /// Label is 1 when the feature rose over the window
    fn rising_windows(n: usize, steps: usize) -> (Array3<f64>, Array1<f64>) {
        let windows = Array3::from_shape_fn((n, steps, 1), |(i, t, _)| {
            let slope = if i % 2 == 0 { 1.0 } else { -1.0 };
            slope * t as f64 * 0.3 + (i % 5) as f64 * 0.1 + 0.5
        });
        let y = (0..n).map(|i| if i % 2 == 0 { 1.0 } else { 0.0 }).collect();
        (windows, y)
    }

    fn numeric_gradient_check(arch: RecurrentArchitecture, objective: RecurrentObjective) {
        let (windows, y) = rising_windows(2, 4);
        let config = RecurrentConfig::new(arch)
            .with_objective(objective)
            .with_hidden_size(3)
            .with_random_state(Some(11));
        let mut net = RecurrentNetwork::new(config);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(11);
        net.build(1, &mut rng);

        let x = windows.index_axis(Axis(0), 0).to_owned();
        let (_, grads) = net.sample_gradients(&x, y[0]).unwrap();

        let eps = 1e-6;
        for (p_idx, g) in grads.iter().enumerate() {
            let (r, c) = (0, 0);
            let original = net.params()[p_idx][[r, c]];
            net.params_mut()[p_idx][[r, c]] = original + eps;
            let plus = net.sample_gradients(&x, y[0]).unwrap().0;
            net.params_mut()[p_idx][[r, c]] = original - eps;
            let minus = net.sample_gradients(&x, y[0]).unwrap().0;
            net.params_mut()[p_idx][[r, c]] = original;

            let numeric = (plus - minus) / (2.0 * eps);
            assert!(
                (numeric - g[[r, c]]).abs() < 1e-5,
                "{} param {}: numeric {} analytic {}",
                arch.name(),
                p_idx,
                numeric,
                g[[r, c]]
            );
        }
    }

    #[test]
    fn test_gradients_match_finite_differences() {
        for arch in RecurrentArchitecture::ALL {
            numeric_gradient_check(arch, RecurrentObjective::Classification);
            numeric_gradient_check(arch, RecurrentObjective::Regression);
        }
    }

    #[test]
    fn test_regression_tracks_window_level() {
        // target is the last value of each window
        let windows = Array3::from_shape_fn((40, 5, 1), |(i, t, _)| 10.0 + (i % 8) as f64 + 0.1 * t as f64);
        let y: Array1<f64> = (0..40).map(|i| 10.4 + (i % 8) as f64).collect();
        let config = RecurrentConfig::new(RecurrentArchitecture::Lstm1)
            .with_objective(RecurrentObjective::Regression)
            .with_epochs(60)
            .with_batch_size(8)
            .with_random_state(Some(5));
        let mut net = RecurrentNetwork::new(config);
        net.fit(windows.view(), y.view()).unwrap();

        let pred = net.predict_values(windows.view()).unwrap();
        let mae = (&pred - &y).mapv(f64::abs).mean().unwrap();
        assert!(mae < 1.0, "mae {}", mae);
        let history = net.history().loss();
        assert!(history[history.len() - 1] < history[0]);
        assert!(matches!(net.predict_proba(windows.view()), Err(TrendlabError::InvalidInput(_))));
    }

    #[test]
    fn test_classification_rejects_continuous_labels() {
        let (windows, _) = rising_windows(4, 3);
        let mut net = RecurrentNetwork::new(RecurrentConfig::default().with_epochs(1));
        let y = Array1::from_vec(vec![0.5, 1.0, 0.0, 2.0]);
        assert!(matches!(net.fit(windows.view(), y.view()), Err(TrendlabError::InvalidInput(_))));
    }

    #[test]
    fn test_lstm_learns_direction() {
        let (windows, y) = rising_windows(40, 6);
        let config = RecurrentConfig::new(RecurrentArchitecture::Lstm1)
            .with_epochs(30)
            .with_batch_size(8)
            .with_random_state(Some(3));
        let mut net = RecurrentNetwork::new(config);
        net.fit(windows.view(), y.view()).unwrap();

        let p = net.predict_proba(windows.view()).unwrap();
        let correct = p.iter().zip(y.iter()).filter(|(&p, &t)| (p >= 0.5) == (t == 1.0)).count();
        assert!(correct >= 32, "correct {}", correct);
        assert_eq!(net.history().len(), 30);
    }

    #[test]
    fn test_seeded_training_is_reproducible() {
        let (windows, y) = rising_windows(12, 4);
        let config = RecurrentConfig::new(RecurrentArchitecture::CnnBiLstm)
            .with_epochs(3)
            .with_hidden_size(4)
            .with_random_state(Some(9));
        let mut a = RecurrentNetwork::new(config.clone());
        let mut b = RecurrentNetwork::new(config);
        a.fit(windows.view(), y.view()).unwrap();
        b.fit(windows.view(), y.view()).unwrap();
        assert_eq!(a.predict_proba(windows.view()).unwrap(), b.predict_proba(windows.view()).unwrap());
        assert_eq!(a.history().loss(), b.history().loss());
    }

    #[test]
    fn test_seq_len_truncates_windows() {
        let (windows, y) = rising_windows(6, 5);
        let config = RecurrentConfig::new(RecurrentArchitecture::Lstm1)
            .with_epochs(1)
            .with_seq_len(Some(2))
            .with_random_state(Some(1));
        let mut net = RecurrentNetwork::new(config);
        net.fit(windows.view(), y.view()).unwrap();
        let scaler = net.scaler.clone().unwrap();
        assert_eq!(net.prepare(windows.view(), &scaler)[0].nrows(), 2);
    }

    #[test]
    fn test_architecture_names() {
        for arch in RecurrentArchitecture::ALL {
            assert_eq!(RecurrentArchitecture::from_name(arch.name()), Some(arch));
        }
        assert_eq!(RecurrentArchitecture::from_name("gru"), None);
    }
}
